// src/install/file.rs

//! Single-file installs: EPG source descriptors and the package feed

use super::restrict_permissions;
use crate::error::Result;
use crate::host::PackageTool;
use crate::http::{HttpClient, LIST_TIMEOUT};
use crate::worker::{Job, TaskContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parent_label(path: &Path) -> String {
    path.parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Download one file over an existing one
pub struct FileInstallJob {
    pub url: String,
    pub target: PathBuf,
    pub timeout: Duration,
}

impl FileInstallJob {
    pub fn new(url: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Job for FileInstallJob {
    type Output = String;

    fn name(&self) -> &'static str {
        "file-install"
    }

    fn run(self, ctx: &TaskContext) -> Result<String> {
        let label = file_label(&self.target);
        ctx.begin_item(1, 1, &label);

        let client = HttpClient::new(self.timeout)?;
        client.download(&self.url, &self.target, ctx)?;
        restrict_permissions(&self.target)?;

        Ok(format!(
            "File '{}' installed successfully in {}.",
            label,
            parent_label(&self.target)
        ))
    }
}

/// Install the feed descriptor, then refresh the package lists
pub struct FeedInstallJob {
    pub url: String,
    pub conf_path: PathBuf,
    pub tool: Arc<dyn PackageTool>,
    pub timeout: Duration,
}

impl FeedInstallJob {
    pub fn new(url: impl Into<String>, conf_path: impl Into<PathBuf>, tool: Arc<dyn PackageTool>) -> Self {
        Self {
            url: url.into(),
            conf_path: conf_path.into(),
            tool,
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Job for FeedInstallJob {
    type Output = String;

    fn name(&self) -> &'static str {
        "feed-install"
    }

    fn run(self, ctx: &TaskContext) -> Result<String> {
        ctx.begin_item(1, 2, &file_label(&self.conf_path));
        let client = HttpClient::new(self.timeout)?;
        client.download(&self.url, &self.conf_path, ctx)?;
        restrict_permissions(&self.conf_path)?;

        ctx.checkpoint()?;
        ctx.begin_item(2, 2, "opkg update");
        ctx.analyzing();
        self.tool.update()?;

        info!("Feed installed at {}", self.conf_path.display());
        Ok(format!(
            "Feed installed in {} and package lists updated.",
            self.conf_path.display()
        ))
    }
}
