// src/install/mod.rs

//! Install workers
//!
//! Every batch install follows the same contract:
//! - items are processed in selection order, one `begin_item` per item
//! - a failing item is recorded and the batch moves on
//! - cancellation stops the batch before the next item and surfaces as
//!   [`Error::Cancelled`] instead of a summary
//! - temporary areas are owned by `TempDir` values and removed on every
//!   exit path

pub mod bouquets;
pub mod file;
pub mod packages;
pub mod picons;
pub mod tree;

use crate::error::{Error, Result};
use crate::worker::TaskContext;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Permissions of installed artifacts: owner rw, group and other r
pub const ARTIFACT_MODE: u32 = 0o644;

/// Apply [`ARTIFACT_MODE`] to an installed file
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(ARTIFACT_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// A batch item that could not be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub reason: String,
}

/// Combined result of a batch install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    /// Descriptions of installed items, in processing order
    pub installed: Vec<String>,
    pub failed: Vec<ItemFailure>,
    /// Non-fatal remarks (reload failures and the like)
    pub caveats: Vec<String>,
}

impl InstallSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, description: impl Into<String>) {
        self.installed.push(description.into());
    }

    pub fn record_failure(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(ItemFailure {
            name: name.into(),
            reason: reason.into(),
        });
    }

    pub fn add_caveat(&mut self, caveat: impl Into<String>) {
        self.caveats.push(caveat.into());
    }

    pub fn succeeded(&self) -> usize {
        self.installed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when no item was attempted
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.failed.is_empty()
    }

    /// Human-readable final message
    pub fn message(&self) -> String {
        let mut sections = Vec::new();

        if !self.installed.is_empty() {
            let lines: Vec<String> = self.installed.iter().map(|i| format!("- {}", i)).collect();
            sections.push(format!(
                "Installed successfully ({}):\n{}",
                self.installed.len(),
                lines.join("\n")
            ));
        }

        if !self.failed.is_empty() {
            let lines: Vec<String> = self
                .failed
                .iter()
                .map(|f| format!("- {}: {}", f.name, f.reason))
                .collect();
            sections.push(format!(
                "Installation errors ({}):\n{}",
                self.failed.len(),
                lines.join("\n")
            ));
        }

        if sections.is_empty() {
            sections.push("No operations were performed.".to_string());
        }

        sections.extend(self.caveats.iter().cloned());
        sections.join("\n\n")
    }
}

/// Drive a batch: one item at a time, failures isolated, cancellation fatal
///
/// `install` returns the description recorded for a successful item.
pub fn run_batch<T, F>(
    ctx: &TaskContext,
    items: &[T],
    label: impl Fn(&T) -> String,
    mut install: F,
) -> Result<InstallSummary>
where
    F: FnMut(usize, &T) -> Result<String>,
{
    let mut summary = InstallSummary::new();
    let count = items.len();

    for (index, item) in items.iter().enumerate() {
        ctx.checkpoint()?;
        let name = label(item);
        ctx.begin_item(index + 1, count, &name);

        match install(index, item) {
            Ok(description) => {
                debug!("Installed {}", name);
                summary.record_success(description);
            }
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                warn!("Failed to install {}: {}", name, e);
                summary.record_failure(name, e.to_string());
            }
        }
    }

    info!(
        "Batch finished: {} installed, {} failed",
        summary.succeeded(),
        summary.failed_count()
    );
    Ok(summary)
}

/// Copy a directory tree, creating `dst`
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            debug!("Skipping symlink {}", entry.path().display());
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move a file, falling back to copy + remove across filesystems
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)?;
    Ok(())
}

/// Remove whatever lives at `path` (file or directory tree)
pub fn remove_existing(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
