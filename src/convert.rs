// src/convert.rs

//! Bouquet generators
//!
//! Two input formats are turned into Enigma2 bouquet files:
//! - M3U playlists (`#EXTINF` metadata line followed by a URL line)
//! - JSON channel maps (`{category: [{"name": .., "url": ..}, ..]}`)
//!
//! Each stream becomes a `#SERVICE 4097:...` line with the URL
//! percent-encoded, so the only raw colons left on the line are field
//! separators.

use crate::error::{Error, Result};
use crate::http::{HttpClient, LIST_TIMEOUT};
use crate::install::bouquets::register_bouquet;
use crate::install::restrict_permissions;
use crate::reload::{reload_caveat, ServiceReloader};
use crate::worker::{Job, TaskContext};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Name used when an `#EXTINF` line carries no usable name
pub const PLACEHOLDER_NAME: &str = "Unknown channel";

/// One stream of a generated bouquet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub url: String,
}

/// M3U playlist reader
pub struct M3uParser {
    tvg_name: Regex,
    group_title: Regex,
    url_scheme: Regex,
}

impl M3uParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::ParseError(format!("Invalid playlist pattern: {}", e)))
        };
        Ok(Self {
            tvg_name: compile(r#"tvg-name="([^"]*)""#)?,
            group_title: compile(r#"group-title="([^"]*)""#)?,
            url_scheme: compile(r"^[a-zA-Z][a-zA-Z0-9+.-]*://")?,
        })
    }

    /// Channel name of an `#EXTINF` line
    ///
    /// Tried in order: `tvg-name`, `group-title`, the text after the last
    /// comma. Empty candidates fall through to the next rule.
    pub fn channel_name(&self, line: &str) -> String {
        let attribute = |re: &Regex| {
            re.captures(line)
                .map(|caps| caps[1].trim().to_string())
                .filter(|name| !name.is_empty())
        };

        attribute(&self.tvg_name)
            .or_else(|| attribute(&self.group_title))
            .or_else(|| {
                line.rsplit_once(',')
                    .map(|(_, name)| name.trim().to_string())
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| PLACEHOLDER_NAME.to_string())
    }

    /// Pair every metadata line with the URL line that follows it
    ///
    /// URL lines without a preceding `#EXTINF` are ignored.
    pub fn parse(&self, content: &str) -> Vec<Channel> {
        let mut channels = Vec::new();
        let mut pending: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("#EXTINF:") {
                pending = Some(self.channel_name(line));
            } else if self.url_scheme.is_match(line)
                && let Some(name) = pending.take()
            {
                channels.push(Channel {
                    name,
                    url: line.to_string(),
                });
            }
        }

        debug!("Parsed {} channels from playlist", channels.len());
        channels
    }
}

/// Convenience wrapper around [`M3uParser`]
pub fn parse_m3u(content: &str) -> Result<Vec<Channel>> {
    Ok(M3uParser::new()?.parse(content))
}

#[derive(Debug, Deserialize)]
struct ChannelMapEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Parse a JSON channel map; entries missing a name or URL are skipped
///
/// Categories are visited in key order.
pub fn parse_channel_map(json: &str) -> Result<Vec<Channel>> {
    let categories: BTreeMap<String, Vec<ChannelMapEntry>> = serde_json::from_str(json)?;
    Ok(categories
        .into_values()
        .flatten()
        .filter_map(|entry| match (entry.name, entry.url) {
            (Some(name), Some(url)) => Some(Channel { name, url }),
            _ => None,
        })
        .collect())
}

/// Percent-encode a stream URL; space becomes `%20`
pub fn encode_url(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

fn clean_name(name: &str) -> String {
    name.replace(':', "-")
}

/// Service line of one stream
pub fn service_line(channel: &Channel) -> String {
    format!(
        "#SERVICE 4097:0:1:0:0:0:0:0:0:0:{}:{}\n",
        encode_url(&channel.url),
        clean_name(&channel.name)
    )
}

/// Bouquet with a `#NAME` header and one service line per channel
pub fn render_bouquet(list_name: &str, channels: &[Channel]) -> String {
    let mut out = format!("#NAME {}\n", list_name);
    for channel in channels {
        out.push_str(&service_line(channel));
    }
    out
}

/// Like [`render_bouquet`], with a `#DESCRIPTION` line after each service
pub fn render_described_bouquet(list_name: &str, channels: &[Channel]) -> String {
    let mut out = format!("#NAME {}\n", list_name);
    for channel in channels {
        out.push_str(&service_line(channel));
        out.push_str(&format!("#DESCRIPTION {}\n", clean_name(&channel.name)));
    }
    out
}

/// Input format of a [`ConvertJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    M3u,
    ChannelMap,
}

impl PlaylistFormat {
    /// Parse a downloaded document and render the bouquet text
    pub fn convert(&self, list_name: &str, content: &str) -> Result<(String, usize)> {
        match self {
            PlaylistFormat::M3u => {
                let channels = parse_m3u(content)?;
                Ok((render_bouquet(list_name, &channels), channels.len()))
            }
            PlaylistFormat::ChannelMap => {
                let channels = parse_channel_map(content)?;
                Ok((render_described_bouquet(list_name, &channels), channels.len()))
            }
        }
    }
}

/// Download a playlist, write it as a bouquet and register it
pub struct ConvertJob {
    pub source_url: String,
    /// Bouquet file inside the channel-list directory
    pub output_path: PathBuf,
    pub list_name: String,
    pub format: PlaylistFormat,
    pub reloader: Box<dyn ServiceReloader>,
    pub timeout: Duration,
}

impl ConvertJob {
    pub fn new(
        source_url: impl Into<String>,
        output_path: impl Into<PathBuf>,
        list_name: impl Into<String>,
        format: PlaylistFormat,
        reloader: Box<dyn ServiceReloader>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            output_path: output_path.into(),
            list_name: list_name.into(),
            format,
            reloader,
            timeout: LIST_TIMEOUT,
        }
    }
}

impl Job for ConvertJob {
    type Output = String;

    fn name(&self) -> &'static str {
        "convert"
    }

    fn run(self, ctx: &TaskContext) -> Result<String> {
        let file_name = self
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::ParseError(format!("Invalid bouquet path {}", self.output_path.display()))
            })?;
        let channel_dir = self
            .output_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        let workdir = tempfile::Builder::new().prefix("stbpanel-convert-").tempdir()?;
        let source = workdir.path().join("playlist");

        let client = HttpClient::new(self.timeout)?;
        client.download(&self.source_url, &source, ctx)?;
        ctx.analyzing();

        let content = fs::read_to_string(&source)?;
        let (bouquet, count) = self.format.convert(&self.list_name, &content)?;
        ctx.checkpoint()?;

        fs::create_dir_all(&channel_dir)?;
        fs::write(&self.output_path, bouquet)?;
        restrict_permissions(&self.output_path)?;
        info!("Wrote {} channels to {}", count, self.output_path.display());

        let mut message = format!(
            "Bouquet '{}' converted successfully ({} channels).",
            self.list_name, count
        );
        if register_bouquet(&channel_dir, &file_name)? {
            message.push_str("\nAdded entry to the master bouquet list.");
        } else {
            message.push_str("\nEntry already present in the master bouquet list.");
        }

        if let Some(caveat) = reload_caveat(self.reloader.as_ref()) {
            message.push_str(&format!("\n\n{}", caveat));
        }
        Ok(message)
    }
}
