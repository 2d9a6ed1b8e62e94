// src/install/picons.rs

//! Picon pack installation
//!
//! Each selected pack is a zip of logo images. Members are extracted into a
//! staging area inside the batch's temporary directory and then moved,
//! flattened to their file names, into the picon directory.

use super::{move_file, restrict_permissions, run_batch, InstallSummary};
use crate::archive;
use crate::discovery::listing::display_name;
use crate::error::Result;
use crate::http::{join_url, HttpClient, LIST_TIMEOUT};
use crate::worker::{Job, TaskContext};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Download and install the selected picon packs
pub struct PiconInstallJob {
    /// Directory-listing URL the identifiers are relative to
    pub base_url: String,
    /// Listing identifiers (hrefs) in selection order
    pub selected: Vec<String>,
    pub target_dir: PathBuf,
    pub timeout: Duration,
}

impl PiconInstallJob {
    pub fn new(base_url: impl Into<String>, selected: Vec<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            selected,
            target_dir: target_dir.into(),
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Job for PiconInstallJob {
    type Output = InstallSummary;

    fn name(&self) -> &'static str {
        "picon-install"
    }

    fn run(self, ctx: &TaskContext) -> Result<InstallSummary> {
        fs::create_dir_all(&self.target_dir)?;
        let workdir = tempfile::Builder::new().prefix("stbpanel-picons-").tempdir()?;
        let client = HttpClient::new(self.timeout)?;

        info!(
            "Installing {} picon packs into {}",
            self.selected.len(),
            self.target_dir.display()
        );

        let summary = run_batch(
            ctx,
            &self.selected,
            |id| display_name(id),
            |index, id| {
                let url = join_url(&self.base_url, id)?;
                let staging = workdir.path().join(format!("item-{}", index + 1));
                let result = install_pack(&client, &url, &staging, &self.target_dir, ctx);
                // Per-item leftovers go now; the whole workdir goes on drop.
                discard_staging(&staging);
                let count = result?;
                Ok(format!("{} ({} picons)", display_name(id), count))
            },
        )?;
        Ok(summary)
    }
}

fn discard_staging(staging: &Path) {
    if staging.exists()
        && let Err(e) = fs::remove_dir_all(staging)
    {
        warn!("Failed to remove staging directory {}: {}", staging.display(), e);
    }
}

/// Install one pack, returning the number of picons placed in `target_dir`
fn install_pack(
    client: &HttpClient,
    url: &str,
    staging: &Path,
    target_dir: &Path,
    ctx: &TaskContext,
) -> Result<usize> {
    fs::create_dir_all(staging)?;
    let zip_path = staging.join("pack.zip");
    client.download(url, &zip_path, ctx)?;
    ctx.analyzing();

    let extract_dir = staging.join("files");
    let written = {
        let mut zip = archive::open(&zip_path)?;
        archive::extract_all(&mut zip, &extract_dir, ctx)?
    };

    let mut count = 0;
    for path in written {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let dest = target_dir.join(file_name);
        move_file(&path, &dest)?;
        restrict_permissions(&dest)?;
        count += 1;
    }

    debug!("Placed {} picons from {}", count, url);
    Ok(count)
}
