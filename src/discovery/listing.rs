// src/discovery/listing.rs

//! HTML directory-listing discovery
//!
//! Scrapes `href` attributes ending in a given suffix out of an index page.

use super::{ListingEntry, RemoteListing};
use crate::error::{Error, Result};
use crate::http::{HttpClient, LIST_TIMEOUT};
use crate::worker::{Job, TaskContext};
use regex::Regex;
use std::time::Duration;
use tracing::info;

/// Extract every `href` value ending in `suffix` (case-insensitive)
pub fn parse_hrefs(html: &str, suffix: &str) -> Result<Vec<String>> {
    let pattern = format!(r#"(?i)href\s*=\s*"([^"]+{})""#, regex::escape(suffix));
    let re = Regex::new(&pattern)
        .map_err(|e| Error::ParseError(format!("Invalid listing pattern: {}", e)))?;

    Ok(re
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect())
}

/// Display name of an href: last path segment, percent-decoded
pub fn display_name(href: &str) -> String {
    let last = href
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(href);
    urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string())
}

/// Turn an index page into a listing; no match is a failure
pub fn parse_listing(html: &str, suffix: &str) -> Result<RemoteListing> {
    let entries = parse_hrefs(html, suffix)?
        .into_iter()
        .map(|href| {
            let name = display_name(&href);
            ListingEntry::new(href, name)
        });
    let listing = RemoteListing::from_entries(entries);

    if listing.is_empty() {
        return Err(Error::NotFoundError(format!(
            "No *{} files found in the directory listing",
            suffix
        )));
    }
    Ok(listing)
}

/// Fetch a directory listing page and collect matching files
pub struct DirectoryListingJob {
    pub url: String,
    pub suffix: String,
    pub timeout: Duration,
}

impl DirectoryListingJob {
    pub fn new(url: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            suffix: suffix.into(),
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Job for DirectoryListingJob {
    type Output = RemoteListing;

    fn name(&self) -> &'static str {
        "directory-listing"
    }

    fn run(self, ctx: &TaskContext) -> Result<RemoteListing> {
        let client = HttpClient::new(self.timeout)?;
        let html = client.fetch_text(&self.url)?;
        ctx.checkpoint()?;

        let listing = parse_listing(&html, &self.suffix)?;
        info!("Found {} *{} files at {}", listing.len(), self.suffix, self.url);
        Ok(listing)
    }
}
