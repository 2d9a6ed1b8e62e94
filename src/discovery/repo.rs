// src/discovery/repo.rs

//! Repository-archive discovery
//!
//! Downloads a source snapshot (`.zip` of a git branch), extracts it into a
//! private temporary directory and enumerates installable items inside the
//! expected top-level directory. The temporary directory travels with the
//! returned [`RepoSnapshot`] and is deleted when the snapshot is dropped.

use super::{ListingEntry, RemoteListing};
use crate::archive;
use crate::config::PanelConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, LIST_TIMEOUT};
use crate::worker::{Job, TaskContext};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// Strategy for picking installable items out of an extracted repository
pub trait ItemFinder: Send {
    /// Return absolute paths of the items found under `root`
    fn find(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Files (searched recursively) with one of the given extensions or names
pub struct FindByExtension {
    extensions: Vec<String>,
    names: Vec<String>,
}

impl FindByExtension {
    pub fn new(extensions: &[&str], names: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            names: names.iter().map(|n| n.to_lowercase()).collect(),
        }
    }

    /// Bouquet files: `.tv`, `.radio`, `.userbouquet` and the master lists
    pub fn bouquets() -> Self {
        Self::new(
            &[".tv", ".radio", ".userbouquet"],
            &["bouquets.tv", "bouquets.radio"],
        )
    }

    fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
            || self.names.iter().any(|n| *n == lower)
    }

    fn walk(&self, dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.walk(&path, found)?;
            } else if self.matches(&entry.file_name().to_string_lossy()) {
                found.push(path);
            }
        }
        Ok(())
    }
}

impl ItemFinder for FindByExtension {
    fn find(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        self.walk(root, &mut found)?;
        Ok(found)
    }
}

/// Named second-level directories from a fixed allow-list
pub struct FindNamedSubdirectories {
    names: Vec<String>,
}

impl FindNamedSubdirectories {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl ItemFinder for FindNamedSubdirectories {
    fn find(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .names
            .iter()
            .map(|name| root.join(name))
            .filter(|path| path.is_dir())
            .collect())
    }
}

/// Every non-hidden directory directly under the root
pub struct FindAllSubdirectories;

impl ItemFinder for FindAllSubdirectories {
    fn find(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_dir() {
                found.push(entry.path());
            }
        }
        Ok(found)
    }
}

/// Kind of repository snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    Bouquets,
    FastBouquets,
    Skins,
    Plugins,
}

impl RepoKind {
    /// Plural label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            RepoKind::Bouquets | RepoKind::FastBouquets => "bouquets",
            RepoKind::Skins => "skins",
            RepoKind::Plugins => "plugins",
        }
    }
}

/// Where a snapshot comes from and how its items are found
pub struct RepoSource {
    pub kind: RepoKind,
    pub url: String,
    /// Top-level directory expected inside the archive
    pub top_dir: String,
    pub finder: Box<dyn ItemFinder>,
}

impl RepoSource {
    pub fn new(kind: RepoKind, url: &str, top_dir: &str, finder: Box<dyn ItemFinder>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            top_dir: top_dir.to_string(),
            finder,
        }
    }

    /// Configured source for a repository kind
    pub fn for_kind(kind: RepoKind, config: &PanelConfig) -> Self {
        match kind {
            RepoKind::Bouquets => Self::new(
                kind,
                &config.bouquets_zip_url,
                &config.bouquets_repo_name,
                Box::new(FindByExtension::bouquets()),
            ),
            RepoKind::FastBouquets => Self::new(
                kind,
                &config.fast_bouquets_zip_url,
                &config.fast_bouquets_repo_name,
                Box::new(FindByExtension::bouquets()),
            ),
            RepoKind::Skins => Self::new(
                kind,
                &config.skins_zip_url,
                &config.skins_repo_name,
                Box::new(FindNamedSubdirectories::new(config.skin_folders.clone())),
            ),
            RepoKind::Plugins => Self::new(
                kind,
                &config.plugins_zip_url,
                &config.plugins_repo_name,
                Box::new(FindAllSubdirectories),
            ),
        }
    }
}

/// One item found in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoItem {
    /// Path relative to the repository root, unique within the snapshot
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// Extracted repository plus the items found in it
///
/// Owns the temporary extraction directory.
#[derive(Debug)]
pub struct RepoSnapshot {
    kind: RepoKind,
    workdir: TempDir,
    items: Vec<RepoItem>,
}

impl RepoSnapshot {
    pub fn kind(&self) -> RepoKind {
        self.kind
    }

    pub fn items(&self) -> &[RepoItem] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&RepoItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Temporary directory holding the extracted repository
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn listing(&self) -> RemoteListing {
        RemoteListing::from_entries(
            self.items
                .iter()
                .map(|i| ListingEntry::new(i.id.clone(), i.name.clone())),
        )
    }

    /// Delete the temporary directory now instead of on drop
    pub fn close(self) -> Result<()> {
        debug!("Removing snapshot directory {}", self.workdir.path().display());
        self.workdir.close()?;
        Ok(())
    }
}

/// Download a repository snapshot and enumerate its items
pub struct RepoArchiveJob {
    pub source: RepoSource,
    pub timeout: Duration,
}

impl RepoArchiveJob {
    pub fn new(source: RepoSource) -> Self {
        Self {
            source,
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Job for RepoArchiveJob {
    type Output = RepoSnapshot;

    fn name(&self) -> &'static str {
        "repo-archive"
    }

    fn run(self, ctx: &TaskContext) -> Result<RepoSnapshot> {
        let RepoSource {
            kind,
            url,
            top_dir,
            finder,
        } = self.source;

        // Dropped (and deleted) on every early return below.
        let workdir = tempfile::Builder::new().prefix("stbpanel-repo-").tempdir()?;
        let zip_path = workdir.path().join("repo.zip");

        let client = HttpClient::new(self.timeout)?;
        client.download(&url, &zip_path, ctx)?;
        ctx.analyzing();

        // Members land under `tree/` so none of them can clobber the archive.
        let tree = workdir.path().join("tree");
        fs::create_dir_all(&tree)?;
        {
            let mut zip = archive::open(&zip_path)?;
            archive::extract_all(&mut zip, &tree, ctx)?;
        }
        fs::remove_file(&zip_path)?;

        let base = tree.join(&top_dir);
        if !base.is_dir() {
            return Err(Error::NotFoundError(format!(
                "Repository directory '{}' not found in the archive",
                top_dir
            )));
        }

        let mut items = Vec::new();
        for path in finder.find(&base)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let id = path
                .strip_prefix(&base)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            items.push(RepoItem { id, name, path });
        }

        if items.is_empty() {
            return Err(Error::NotFoundError(format!(
                "No {} found in the repository",
                kind.label()
            )));
        }

        items.sort_by_cached_key(|i| (i.name.to_lowercase(), i.id.clone()));
        info!("Found {} {} in {}", items.len(), kind.label(), top_dir);

        Ok(RepoSnapshot {
            kind,
            workdir,
            items,
        })
    }
}
