// src/config.rs

//! Panel configuration: target directories and remote sources
//!
//! Defaults describe a stock Enigma2 receiver. A JSON file may override any
//! subset of the fields.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default database path for persisted settings
pub const DEFAULT_DB_PATH: &str = "/etc/stbpanel/stbpanel.db";

/// Directories written by the installers and URLs they read from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Channel-list directory holding bouquets and the master lists
    pub bouquet_dir: PathBuf,
    /// Directory of the EPG importer's source descriptors
    pub epg_sources_dir: PathBuf,
    pub epg_sources_filename: String,
    pub epg_sources_url: String,

    pub picons_url: String,
    pub default_picon_dir: PathBuf,
    /// Recommended picon directories as (path, label)
    pub recommended_picon_dirs: Vec<(PathBuf, String)>,

    pub bouquets_zip_url: String,
    pub bouquets_repo_name: String,
    pub fast_bouquets_zip_url: String,
    pub fast_bouquets_repo_name: String,

    pub iptv_org_url: String,
    pub iptv_org_filename: String,
    pub iptv_org_name: String,

    /// Base directory that must exist before skins or plugins install
    pub e2kodi_dir: PathBuf,
    pub skins_zip_url: String,
    pub skins_repo_name: String,
    pub skins_target_dir: PathBuf,
    /// Second-level skin directories offered for install
    pub skin_folders: Vec<String>,
    pub plugins_zip_url: String,
    pub plugins_repo_name: String,
    pub plugins_target_dir: PathBuf,

    pub feed_conf_url: String,
    pub feed_conf_path: PathBuf,
    /// Package index of the feed (Packages or Packages.gz)
    pub feed_index_url: String,

    /// Receiver web interface used for channel-list reloads
    pub reload_url: Option<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            bouquet_dir: PathBuf::from("/etc/enigma2"),
            epg_sources_dir: PathBuf::from("/etc/epgimport"),
            epg_sources_filename: "polandAzman.sources.xml".to_string(),
            epg_sources_url:
                "https://raw.githubusercontent.com/azman26/EPGazman/main/polandAzman.sources.xml"
                    .to_string(),

            picons_url: "https://www.topolowa4.pl/Picony/".to_string(),
            default_picon_dir: PathBuf::from("/media/hdd/picon"),
            recommended_picon_dirs: vec![
                (PathBuf::from("/media/hdd/picon"), "HDD (/media/hdd/picon)".to_string()),
                (PathBuf::from("/media/usb/picon"), "USB (/media/usb/picon)".to_string()),
            ],

            bouquets_zip_url:
                "https://github.com/azman26/azmanIPTVsettings/archive/refs/heads/main.zip"
                    .to_string(),
            bouquets_repo_name: "azmanIPTVsettings-main".to_string(),
            fast_bouquets_zip_url:
                "https://github.com/azman26/azmanFASTsettings/archive/refs/heads/main.zip"
                    .to_string(),
            fast_bouquets_repo_name: "azmanFASTsettings-main".to_string(),

            iptv_org_url: "https://raw.githubusercontent.com/iptv-org/iptv/master/streams/pl.m3u"
                .to_string(),
            iptv_org_filename: "userbouquet.iptvorg_pl.tv".to_string(),
            iptv_org_name: "iptv.org m3u PL".to_string(),

            e2kodi_dir: PathBuf::from("/etc/E2Kodi"),
            skins_zip_url:
                "https://github.com/azman26/enigma2-E2K-skins/archive/refs/heads/main.zip"
                    .to_string(),
            skins_repo_name: "enigma2-E2K-skins-main".to_string(),
            skins_target_dir: PathBuf::from("/etc/E2Kodi/userSkins"),
            skin_folders: vec![
                "azman-E2K-MetrixHD-skins".to_string(),
                "jk36-E2K-skins-all".to_string(),
            ],
            plugins_zip_url:
                "https://github.com/azman26/enigma2-E2K-plugins/archive/refs/heads/main.zip"
                    .to_string(),
            plugins_repo_name: "enigma2-E2K-plugins-main".to_string(),
            plugins_target_dir: PathBuf::from(
                "/usr/lib/enigma2/python/Plugins/Extensions/E2Kodi/site-packages/emukodi/Plugins",
            ),

            feed_conf_url: "https://raw.githubusercontent.com/azman26/azman-feed/main/azman-feed.conf"
                .to_string(),
            feed_conf_path: PathBuf::from("/etc/opkg/azman-feed.conf"),
            feed_index_url: "https://raw.githubusercontent.com/azman26/azman-feed/main/Packages.gz"
                .to_string(),

            reload_url: Some("http://127.0.0.1".to_string()),
        }
    }
}

/// One entry of the picon directory chooser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiconDirChoice {
    pub path: PathBuf,
    pub label: String,
    pub recommended: bool,
    /// False when the directory will be created on install
    pub exists: bool,
}

impl PanelConfig {
    /// Load configuration from a JSON file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: PanelConfig = serde_json::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Master list referencing every TV bouquet
    pub fn bouquets_tv(&self) -> PathBuf {
        self.bouquet_dir.join("bouquets.tv")
    }

    pub fn epg_sources_path(&self) -> PathBuf {
        self.epg_sources_dir.join(&self.epg_sources_filename)
    }

    pub fn iptv_org_path(&self) -> PathBuf {
        self.bouquet_dir.join(&self.iptv_org_filename)
    }

    /// Directories offered for picon installation
    ///
    /// Recommended directories come first; `current` (the persisted choice)
    /// is appended when it is not one of them.
    pub fn picon_dir_choices(&self, current: Option<&Path>) -> Vec<PiconDirChoice> {
        let mut choices: Vec<PiconDirChoice> = self
            .recommended_picon_dirs
            .iter()
            .map(|(path, label)| PiconDirChoice {
                path: path.clone(),
                label: label.clone(),
                recommended: true,
                exists: path.is_dir(),
            })
            .collect();

        if let Some(current) = current
            && !choices.iter().any(|c| c.path == current)
        {
            choices.push(PiconDirChoice {
                path: current.to_path_buf(),
                label: current.display().to_string(),
                recommended: false,
                exists: current.is_dir(),
            });
        }

        choices
    }
}
