// src/discovery/packages.rs

//! opkg package-index discovery
//!
//! Parses `Packages` / `Packages.gz` documents (RFC 822-like stanzas
//! separated by blank lines) and tags every record as installed or
//! available using the host's `opkg list-installed` output.

use super::{ListingEntry, RemoteListing};
use crate::error::{Error, Result};
use crate::host::PackageTool;
use crate::http::{HttpClient, INDEX_TIMEOUT};
use crate::worker::{Job, TaskContext};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether a package is present on the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    Available,
}

impl InstallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InstallStatus::Installed => "installed",
            InstallStatus::Available => "available",
        }
    }
}

/// One package of the feed, cross-referenced with the local package set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub section: Option<String>,
    pub status: InstallStatus,
    /// Version reported by the package tool, when installed
    pub installed_version: Option<String>,
}

impl PackageRecord {
    pub fn is_installed(&self) -> bool {
        self.status == InstallStatus::Installed
    }
}

/// Package stanza structure for rfc822-like parsing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IndexEntry {
    package: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    section: Option<String>,
}

/// Decode a package index, gunzipping it when it carries the gzip magic
pub fn decompress_index(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut gz = GzDecoder::new(bytes);
    let mut decompressed = String::new();
    gz.read_to_string(&mut decompressed)
        .map_err(|e| Error::ParseError(format!("Failed to decompress package index: {}", e)))?;

    debug!("Decompressed package index: {} bytes", decompressed.len());
    Ok(decompressed)
}

/// Parse index stanzas into (not yet cross-referenced) records
pub fn parse_package_index(content: &str) -> Result<Vec<PackageRecord>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<IndexEntry> = rfc822_like::from_str(content)
        .map_err(|e| Error::ParseError(format!("Failed to parse package index: {}", e)))?;

    debug!("Parsed {} package entries", entries.len());

    Ok(entries
        .into_iter()
        .map(|entry| PackageRecord {
            name: entry.package,
            version: entry.version,
            description: entry.description,
            section: entry.section,
            status: InstallStatus::Available,
            installed_version: None,
        })
        .collect())
}

/// Tag records against the installed set
///
/// The result is unique by name and sorted case-insensitively.
pub fn cross_reference(
    records: Vec<PackageRecord>,
    installed: &HashMap<String, String>,
) -> Vec<PackageRecord> {
    let mut seen = HashSet::new();
    let mut tagged: Vec<PackageRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.name.clone()))
        .map(|mut record| {
            if let Some(version) = installed.get(&record.name) {
                record.status = InstallStatus::Installed;
                record.installed_version = Some(version.clone());
            }
            record
        })
        .collect();
    tagged.sort_by_cached_key(|r| r.name.to_lowercase());
    tagged
}

/// Keep records whose name contains any keyword (case-insensitive)
///
/// An empty keyword list keeps everything.
pub fn filter_records(records: Vec<PackageRecord>, keywords: &[String]) -> Vec<PackageRecord> {
    if keywords.is_empty() {
        return records;
    }
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    records
        .into_iter()
        .filter(|r| {
            let name = r.name.to_lowercase();
            keywords.iter().any(|k| name.contains(k.as_str()))
        })
        .collect()
}

/// Selection listing for package records (`name (version) - [status]`)
pub fn package_listing(records: &[PackageRecord]) -> RemoteListing {
    RemoteListing::from_entries(records.iter().map(|r| {
        ListingEntry::new(
            r.name.clone(),
            format!("{} ({}) - [{}]", r.name, r.version, r.status.label()),
        )
    }))
}

/// Fetch the feed index and cross-reference it with installed packages
pub struct PackageIndexJob {
    pub index_url: String,
    pub tool: Arc<dyn PackageTool>,
    pub keywords: Vec<String>,
    pub timeout: Duration,
}

impl PackageIndexJob {
    pub fn new(index_url: impl Into<String>, tool: Arc<dyn PackageTool>) -> Self {
        Self {
            index_url: index_url.into(),
            tool,
            keywords: Vec::new(),
            timeout: INDEX_TIMEOUT,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

impl Job for PackageIndexJob {
    type Output = Vec<PackageRecord>;

    fn name(&self) -> &'static str {
        "package-index"
    }

    fn run(self, ctx: &TaskContext) -> Result<Vec<PackageRecord>> {
        let client = HttpClient::new(self.timeout)?;
        let bytes = client.fetch_bytes(&self.index_url)?;
        ctx.checkpoint()?;
        ctx.analyzing();

        let records = parse_package_index(&decompress_index(&bytes)?)?;
        if records.is_empty() {
            return Err(Error::NotFoundError(format!(
                "No packages found in {}",
                self.index_url
            )));
        }

        ctx.checkpoint()?;
        let installed = self.tool.list_installed()?;
        let records = filter_records(cross_reference(records, &installed), &self.keywords);

        info!(
            "{} packages listed ({} installed)",
            records.len(),
            records.iter().filter(|r| r.is_installed()).count()
        );
        Ok(records)
    }
}
