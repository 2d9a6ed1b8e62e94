// src/main.rs

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use stbpanel::config::{PanelConfig, DEFAULT_DB_PATH};
use stbpanel::convert::{ConvertJob, PlaylistFormat};
use stbpanel::db;
use stbpanel::db::models::{picon_dir, set_picon_dir};
use stbpanel::discovery::listing::DirectoryListingJob;
use stbpanel::discovery::packages::{package_listing, PackageIndexJob};
use stbpanel::discovery::repo::{RepoArchiveJob, RepoKind, RepoSnapshot, RepoSource};
use stbpanel::discovery::RemoteListing;
use stbpanel::host::{Opkg, PackageAction, PackageTool};
use stbpanel::http::INDEX_TIMEOUT;
use stbpanel::install::bouquets::BouquetInstallJob;
use stbpanel::install::file::{FeedInstallJob, FileInstallJob};
use stbpanel::install::packages::PackageActionJob;
use stbpanel::install::picons::PiconInstallJob;
use stbpanel::install::tree::{ensure_base_dir, TreeInstallJob};
use stbpanel::install::InstallSummary;
use stbpanel::reload::{self, HttpReloader, ServiceReloader};
use stbpanel::selection::SelectionSet;
use stbpanel::worker::{self, CancellationToken, Job, Outcome, Progress};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Foreground loop period
const TICK: Duration = Duration::from_millis(50);

/// Set by Ctrl-C
static INTERRUPT: OnceLock<CancellationToken> = OnceLock::new();

fn interrupt_token() -> CancellationToken {
    INTERRUPT.get_or_init(CancellationToken::new).clone()
}

#[derive(Parser)]
#[command(name = "stbpanel")]
#[command(author, version, about = "Add-on installer for Enigma2 set-top-boxes", long_about = None)]
struct Cli {
    /// JSON file overriding the built-in directories and URLs
    #[arg(long, global = true, default_value = "/etc/stbpanel/config.json")]
    config: PathBuf,

    /// Settings database path
    #[arg(short, long, global = true, default_value = DEFAULT_DB_PATH)]
    db_path: String,

    /// Receiver web interface used to reload channel lists
    #[arg(long, global = true)]
    reload_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Channel logo packs
    Picons {
        #[command(subcommand)]
        action: PiconCommands,
    },
    /// Bouquets from the repository archives
    Bouquets {
        #[command(subcommand)]
        action: BouquetCommands,
    },
    /// Convert the iptv-org playlist into a bouquet
    IptvOrg,
    /// Convert a JSON channel map into a bouquet
    Channels {
        /// URL of a `{category: [{"name": .., "url": ..}]}` document
        url: String,
        /// Bouquet name shown on the receiver
        #[arg(long, default_value = "YouTube channels")]
        name: String,
        /// Bouquet file inside the channel-list directory
        #[arg(long, default_value = "userbouquet.channels.tv")]
        file: String,
    },
    /// Install the EPG importer source descriptor
    Epg,
    /// Install the package feed and run opkg update
    Feed,
    /// List feed packages
    Packages {
        /// Only show packages whose name contains one of these keywords
        #[arg(short, long)]
        filter: Vec<String>,
    },
    /// Install or remove a feed package
    Package {
        #[command(subcommand)]
        action: PackageCommands,
    },
    /// E2Kodi skins
    Skins {
        #[command(subcommand)]
        action: TreeCommands,
    },
    /// E2Kodi plugins
    Plugins {
        #[command(subcommand)]
        action: TreeCommands,
    },
    /// Show or change persisted settings
    Settings {
        /// Remember this picon directory
        #[arg(long)]
        picon_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PiconCommands {
    /// List available picon packs
    List,
    /// Install picon packs by name
    Install {
        packs: Vec<String>,
        /// Install every pack
        #[arg(short, long)]
        all: bool,
        /// Target directory (remembered for next time)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BouquetCommands {
    /// List bouquets in the repository
    List {
        /// Use the FAST channels repository
        #[arg(long)]
        fast: bool,
    },
    /// Install bouquets by name or path
    Install {
        items: Vec<String>,
        #[arg(short, long)]
        all: bool,
        #[arg(long)]
        fast: bool,
    },
}

#[derive(Subcommand)]
enum TreeCommands {
    /// List available items
    List,
    /// Install items by name
    Install {
        items: Vec<String>,
        #[arg(short, long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum PackageCommands {
    Install { name: String },
    Remove { name: String },
}

/// Run a job in the background and drive it until it finishes
///
/// Ctrl-C cancels the job; the loop keeps draining until the worker has
/// cleaned up and reported `Cancelled`.
fn run_job<J: Job>(job: J) -> Result<J::Output> {
    let interrupt = interrupt_token();
    let mut handle = worker::start(job)?;
    let mut shown = false;
    let mut cancelling = false;

    loop {
        if handle.cancel_if_set(&interrupt) {
            cancelling = true;
            eprint!("\r\x1b[2KCancelling...");
            let _ = std::io::stderr().flush();
            shown = true;
        }

        let outcome = handle.tick(|progress| {
            if cancelling {
                return;
            }
            eprint!("\r\x1b[2K{}", render_progress(progress));
            let _ = std::io::stderr().flush();
            shown = true;
        });

        if let Some(outcome) = outcome {
            if shown {
                eprintln!();
            }
            return match outcome {
                Outcome::Completed(value) => Ok(value),
                Outcome::Failed(message) => Err(anyhow!(message)),
                Outcome::Cancelled => bail!("Operation cancelled"),
            };
        }
        thread::sleep(TICK);
    }
}

fn render_progress(progress: &Progress) -> String {
    let prefix = match &progress.item {
        Some(item) if item.count > 1 => format!("({}/{}) {}", item.index, item.count, item.label),
        Some(item) => item.label.clone(),
        None => "Working".to_string(),
    };
    match progress.percent() {
        Some(pct) => format!("{}: {}%", prefix, pct),
        None if progress.bytes > 0 => format!("{}: {} KiB", prefix, progress.bytes / 1024),
        None => format!("{}...", prefix),
    }
}

fn print_listing(listing: &RemoteListing) {
    for entry in listing.entries() {
        println!("  {}", entry.name);
    }
    println!("{} items", listing.len());
}

/// Resolve command-line names against a listing into a selection
fn select(listing: &RemoteListing, names: &[String], all: bool) -> Result<Vec<String>> {
    let mut selection = SelectionSet::new(listing.ids());
    if all {
        selection.toggle_all();
    }
    for name in names {
        let entry = listing
            .lookup(name)
            .ok_or_else(|| anyhow!("'{}' is not in the list", name))?;
        if !selection.is_selected(&entry.id) {
            selection.toggle(&entry.id);
        }
    }
    if selection.is_empty() {
        bail!("Nothing selected; pass item names or --all");
    }
    Ok(selection.into_selected())
}

fn reloader(config: &PanelConfig, reload_url: &Option<String>) -> Box<dyn ServiceReloader> {
    match reload_url {
        Some(url) => Box::new(HttpReloader::new(url.clone())),
        None => reload::from_config(config),
    }
}

fn opkg() -> Arc<dyn PackageTool> {
    Arc::new(Opkg::new(INDEX_TIMEOUT))
}

fn fetch_snapshot(kind: RepoKind, config: &PanelConfig) -> Result<RepoSnapshot> {
    let snapshot = run_job(RepoArchiveJob::new(RepoSource::for_kind(kind, config)))?;
    Ok(snapshot)
}

fn print_summary(summary: &InstallSummary) {
    println!("{}", summary.message());
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let interrupt = interrupt_token();
    ctrlc::set_handler(move || interrupt.cancel())
        .map_err(|e| anyhow!("Failed to install Ctrl-C handler: {}", e))?;

    let cli = Cli::parse();
    let config = PanelConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Picons { action }) => {
            let listing = run_job(DirectoryListingJob::new(&config.picons_url, ".zip"))?;
            match action {
                PiconCommands::List => print_listing(&listing),
                PiconCommands::Install { packs, all, target } => {
                    let selected = select(&listing, &packs, all)?;
                    let conn = db::open_or_init(&cli.db_path)?;
                    let target_dir = match target {
                        Some(dir) => dir,
                        None => picon_dir(&conn, &config.default_picon_dir)?,
                    };
                    info!("Installing picons into {}", target_dir.display());

                    let summary = run_job(PiconInstallJob::new(
                        &config.picons_url,
                        selected,
                        &target_dir,
                    ))?;
                    set_picon_dir(&conn, &target_dir)?;
                    print_summary(&summary);
                }
            }
            Ok(())
        }
        Some(Commands::Bouquets { action }) => {
            let fast = match &action {
                BouquetCommands::List { fast } | BouquetCommands::Install { fast, .. } => *fast,
            };
            let kind = if fast {
                RepoKind::FastBouquets
            } else {
                RepoKind::Bouquets
            };
            let snapshot = fetch_snapshot(kind, &config)?;
            let listing = snapshot.listing();

            match action {
                BouquetCommands::List { .. } => print_listing(&listing),
                BouquetCommands::Install { items, all, .. } => {
                    let selected = select(&listing, &items, all)?;
                    let summary = run_job(BouquetInstallJob {
                        snapshot,
                        selected,
                        channel_dir: config.bouquet_dir.clone(),
                        reloader: reloader(&config, &cli.reload_url),
                    })?;
                    print_summary(&summary);
                }
            }
            Ok(())
        }
        Some(Commands::IptvOrg) => {
            let message = run_job(ConvertJob::new(
                &config.iptv_org_url,
                config.iptv_org_path(),
                &config.iptv_org_name,
                PlaylistFormat::M3u,
                reloader(&config, &cli.reload_url),
            ))?;
            println!("{}", message);
            Ok(())
        }
        Some(Commands::Channels { url, name, file }) => {
            if file.contains(['/', '\\']) || file.starts_with('.') {
                bail!("'{}' must be a plain bouquet file name", file);
            }
            let message = run_job(ConvertJob::new(
                &url,
                config.bouquet_dir.join(&file),
                &name,
                PlaylistFormat::ChannelMap,
                reloader(&config, &cli.reload_url),
            ))?;
            println!("{}", message);
            Ok(())
        }
        Some(Commands::Epg) => {
            let message = run_job(FileInstallJob::new(
                &config.epg_sources_url,
                config.epg_sources_path(),
            ))?;
            println!("{}", message);
            Ok(())
        }
        Some(Commands::Feed) => {
            let message = run_job(FeedInstallJob::new(
                &config.feed_conf_url,
                &config.feed_conf_path,
                opkg(),
            ))?;
            println!("{}", message);
            Ok(())
        }
        Some(Commands::Packages { filter }) => {
            let job = PackageIndexJob::new(&config.feed_index_url, opkg()).with_keywords(filter);
            let records = run_job(job)?;
            if records.is_empty() {
                println!("No matching packages found.");
            } else {
                print_listing(&package_listing(&records));
            }
            Ok(())
        }
        Some(Commands::Package { action }) => {
            let (action, name) = match action {
                PackageCommands::Install { name } => (PackageAction::Install, name),
                PackageCommands::Remove { name } => (PackageAction::Remove, name),
            };
            let message = run_job(PackageActionJob {
                tool: opkg(),
                action,
                package: name,
                reloader: reloader(&config, &cli.reload_url),
            })?;
            println!("{}", message);
            Ok(())
        }
        Some(Commands::Skins { action }) => {
            ensure_base_dir(&config.e2kodi_dir)?;
            run_tree_command(RepoKind::Skins, action, config.skins_target_dir.clone(), &config)
        }
        Some(Commands::Plugins { action }) => {
            ensure_base_dir(&config.e2kodi_dir)?;
            run_tree_command(RepoKind::Plugins, action, config.plugins_target_dir.clone(), &config)
        }
        Some(Commands::Settings { picon_dir: new_dir }) => {
            let conn = db::open_or_init(&cli.db_path)?;
            if let Some(dir) = new_dir {
                set_picon_dir(&conn, &dir)?;
                println!("Picon directory set to {}", dir.display());
            }

            let current = picon_dir(&conn, &config.default_picon_dir)?;
            println!("Picon directories:");
            for choice in config.picon_dir_choices(Some(&current)) {
                let marker = if choice.path == current { "*" } else { " " };
                let mut notes = Vec::new();
                if choice.recommended {
                    notes.push("recommended");
                }
                if !choice.exists {
                    notes.push("will be created");
                }
                let notes = if notes.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", notes.join(", "))
                };
                println!(" {} {}{}", marker, choice.label, notes);
            }
            Ok(())
        }
        None => {
            println!("stbpanel v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'stbpanel --help' for usage information");
            Ok(())
        }
    }
}

fn run_tree_command(
    kind: RepoKind,
    action: TreeCommands,
    target_dir: PathBuf,
    config: &PanelConfig,
) -> Result<()> {
    let snapshot = fetch_snapshot(kind, config)?;
    let listing = snapshot.listing();

    match action {
        TreeCommands::List => print_listing(&listing),
        TreeCommands::Install { items, all } => {
            let selected = select(&listing, &items, all)?;
            let summary = run_job(TreeInstallJob {
                snapshot,
                selected,
                target_dir,
            })?;
            print_summary(&summary);
        }
    }
    Ok(())
}
