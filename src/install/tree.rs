// src/install/tree.rs

//! Directory-tree installation (skins and plugins)
//!
//! A same-named item at the destination is replaced wholesale, never merged.

use super::{copy_dir_recursive, remove_existing, run_batch, InstallSummary};
use crate::discovery::repo::RepoSnapshot;
use crate::error::{Error, Result};
use crate::worker::{Job, TaskContext};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fail with `NotFound` unless the add-on base directory exists
pub fn ensure_base_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    Err(Error::NotFoundError(format!(
        "{} does not exist; install the base plugin first",
        dir.display()
    )))
}

/// Copy a directory tree into `target_dir/<name>`, replacing what is there
pub fn replace_tree(source: &Path, target_dir: &Path, name: &str) -> Result<PathBuf> {
    let dest = target_dir.join(name);
    remove_existing(&dest)?;
    copy_dir_recursive(source, &dest)?;
    Ok(dest)
}

/// Install selected directories out of a repository snapshot
pub struct TreeInstallJob {
    pub snapshot: RepoSnapshot,
    pub selected: Vec<String>,
    pub target_dir: PathBuf,
}

impl Job for TreeInstallJob {
    type Output = InstallSummary;

    fn name(&self) -> &'static str {
        "tree-install"
    }

    fn run(self, ctx: &TaskContext) -> Result<InstallSummary> {
        let TreeInstallJob {
            snapshot,
            selected,
            target_dir,
        } = self;

        fs::create_dir_all(&target_dir)?;
        info!(
            "Installing {} {} into {}",
            selected.len(),
            snapshot.kind().label(),
            target_dir.display()
        );

        let summary = run_batch(ctx, &selected, |id| id.clone(), |_, id| {
            let item = snapshot.item(id).ok_or_else(|| {
                Error::NotFoundError(format!("{} is not part of the downloaded repository", id))
            })?;
            replace_tree(&item.path, &target_dir, &item.name)?;
            Ok(item.name.clone())
        })?;

        if let Err(e) = snapshot.close() {
            warn!("Failed to remove repository snapshot: {}", e);
        }
        Ok(summary)
    }
}
