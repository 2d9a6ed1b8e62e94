// src/install/packages.rs

//! Package install/remove through the host package tool

use crate::error::Result;
use crate::host::{PackageAction, PackageTool};
use crate::reload::{reload_caveat, ServiceReloader};
use crate::worker::{Job, TaskContext};
use std::sync::Arc;
use tracing::info;

/// Message for an action that would not change anything
pub fn refusal(action: PackageAction, installed: bool) -> Option<&'static str> {
    match (action, installed) {
        (PackageAction::Install, true) => Some("This package is already installed."),
        (PackageAction::Remove, false) => Some("This package is not installed."),
        _ => None,
    }
}

/// Run `opkg install|remove <package>`
pub struct PackageActionJob {
    pub tool: Arc<dyn PackageTool>,
    pub action: PackageAction,
    pub package: String,
    pub reloader: Box<dyn ServiceReloader>,
}

impl Job for PackageActionJob {
    type Output = String;

    fn name(&self) -> &'static str {
        "package-action"
    }

    fn run(self, ctx: &TaskContext) -> Result<String> {
        ctx.begin_item(1, 1, &self.package);
        ctx.analyzing();

        let installed = self.tool.list_installed()?.contains_key(&self.package);
        if let Some(message) = refusal(self.action, installed) {
            info!("{} {}: {}", self.action.as_str(), self.package, message);
            return Ok(message.to_string());
        }

        ctx.checkpoint()?;
        let output = self.tool.run(self.action, &self.package)?;

        let verb = match self.action {
            PackageAction::Install => "installed",
            PackageAction::Remove => "removed",
        };
        let mut message = format!("Package {} {}.", self.package, verb);
        let output = output.trim();
        if !output.is_empty() {
            message.push_str(&format!("\n\n{}", output));
        }
        if let Some(caveat) = reload_caveat(self.reloader.as_ref()) {
            message.push_str(&format!("\n\n{}", caveat));
        }
        Ok(message)
    }
}
