// src/reload.rs

//! Host reload bridge
//!
//! After channel lists change the receiver has to re-read them. A failed
//! reload never fails the install; it becomes a caveat in the final message.

use crate::config::PanelConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, LIST_TIMEOUT};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Something that can make the receiver re-read its channel lists
pub trait ServiceReloader: Send + Sync {
    fn reload(&self) -> Result<()>;
}

/// Reload through the receiver's web interface
pub struct HttpReloader {
    base_url: String,
    timeout: Duration,
}

impl HttpReloader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: LIST_TIMEOUT,
        }
    }

    /// Endpoint that reloads services and bouquets
    pub fn endpoint(&self) -> String {
        format!(
            "{}/web/servicelistreload?mode=0",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl ServiceReloader for HttpReloader {
    fn reload(&self) -> Result<()> {
        let url = self.endpoint();
        info!("Reloading channel lists via {}", url);
        let client = HttpClient::new(self.timeout)?;
        client
            .fetch_text(&url)
            .map_err(|e| Error::ReloadError(e.to_string()))?;
        Ok(())
    }
}

/// For hosts without a reload mechanism
pub struct NoopReloader;

impl ServiceReloader for NoopReloader {
    fn reload(&self) -> Result<()> {
        debug!("Reload skipped: no reload mechanism configured");
        Ok(())
    }
}

/// Reloader selected by the configuration
pub fn from_config(config: &PanelConfig) -> Box<dyn ServiceReloader> {
    match &config.reload_url {
        Some(url) => Box::new(HttpReloader::new(url.clone())),
        None => Box::new(NoopReloader),
    }
}

/// Run a reload, turning failure into a caveat line
pub fn reload_caveat(reloader: &dyn ServiceReloader) -> Option<String> {
    match reloader.reload() {
        Ok(()) => None,
        Err(e) => {
            warn!("Channel list reload failed: {}", e);
            Some(format!(
                "Files were installed, but the channel list reload failed: {}",
                e
            ))
        }
    }
}
