// src/http.rs

//! HTTP transport for listings, archives and documents
//!
//! All transfers are best-effort and at-most-once: a failed request is
//! reported, never retried.

use crate::error::{Error, Result};
use crate::worker::TaskContext;
use reqwest::Url;
use reqwest::blocking::Client;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timeout for listing pages, archives and documents
pub const LIST_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for package-index operations
pub const INDEX_TIMEOUT: Duration = Duration::from_secs(120);

const CHUNK_SIZE: usize = 64 * 1024;

/// One in-flight download
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub current: u64,
    /// `None` when the server sent no Content-Length
    pub total: Option<u64>,
    pub started: Instant,
}

impl DownloadTask {
    pub fn new(url: &str, dest: &Path) -> Self {
        Self {
            url: url.to_string(),
            dest: dest.to_path_buf(),
            current: 0,
            total: None,
            started: Instant::now(),
        }
    }

    /// Path the body is streamed into before the final rename
    pub fn partial_path(&self) -> PathBuf {
        let mut name = OsString::from(self.dest.as_os_str());
        name.push(".part");
        PathBuf::from(name)
    }
}

/// Blocking HTTP client with a bounded timeout
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new client
    ///
    /// `timeout` bounds connecting, waiting for the response headers and
    /// every single read of the body. A large archive may take longer than
    /// `timeout` overall; a server that stops sending for longer fails the
    /// transfer.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("stbpanel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        Ok(response)
    }

    /// Fetch a whole document as bytes
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        let response = self.get(url)?;
        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response from {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    /// Fetch a whole document as UTF-8 text (lossy)
    pub fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Stream `url` into `dest`, reporting progress through `ctx`
    ///
    /// The body goes to a `.part` file that is renamed over `dest` once
    /// complete, so an existing file is only replaced by a full download.
    /// On error or cancellation the partial file is removed.
    pub fn download(&self, url: &str, dest: &Path, ctx: &TaskContext) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut task = DownloadTask::new(url, dest);
        let partial = task.partial_path();

        let result = self.stream_into(&mut task, &partial, ctx);
        match result {
            Ok(()) => {
                fs::rename(&partial, dest)?;
                ctx.transfer_done(task.current);
                debug!(
                    "Downloaded {} bytes in {:?}",
                    task.current,
                    task.started.elapsed()
                );
                Ok(task.current)
            }
            Err(e) => {
                if partial.exists()
                    && let Err(rm) = fs::remove_file(&partial)
                {
                    warn!("Failed to remove partial file {}: {}", partial.display(), rm);
                }
                Err(e)
            }
        }
    }

    fn stream_into(&self, task: &mut DownloadTask, partial: &Path, ctx: &TaskContext) -> Result<()> {
        ctx.checkpoint()?;

        let mut response = self.get(&task.url)?;
        task.total = response.content_length();

        let mut file = File::create(partial)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = response.read(&mut buffer).map_err(|e| {
                Error::DownloadError(format!("Failed to read response from {}: {}", task.url, e))
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            task.current += n as u64;
            ctx.transfer(task.current, task.total)?;
        }
        file.flush()?;
        Ok(())
    }
}

/// Resolve `item` against a directory URL
pub fn join_url(base: &str, item: &str) -> Result<String> {
    let base = Url::parse(base)
        .map_err(|e| Error::ParseError(format!("Invalid URL '{}': {}", base, e)))?;
    let joined = base
        .join(item)
        .map_err(|e| Error::ParseError(format!("Invalid item URL '{}': {}", item, e)))?;
    Ok(joined.to_string())
}
