// src/install/bouquets.rs

//! Bouquet installation and master-list registration

use super::{restrict_permissions, run_batch, InstallSummary};
use crate::discovery::repo::RepoSnapshot;
use crate::error::{Error, Result};
use crate::reload::{reload_caveat, ServiceReloader};
use crate::worker::{Job, TaskContext};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Master list of TV bouquets
pub const MASTER_TV: &str = "bouquets.tv";
/// Master list of radio bouquets
pub const MASTER_RADIO: &str = "bouquets.radio";

/// True for the list-of-lists files themselves
pub fn is_master_list(file_name: &str) -> bool {
    file_name.eq_ignore_ascii_case(MASTER_TV) || file_name.eq_ignore_ascii_case(MASTER_RADIO)
}

fn is_radio(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".radio")
}

/// Master-list line referencing a bouquet file
pub fn reference_line(file_name: &str) -> String {
    let service_type = if is_radio(file_name) { 2 } else { 1 };
    format!(
        "#SERVICE 1:7:{}:0:0:0:0:0:0:0:FROM BOUQUET \"{}\" ORDER BY bouquet\n",
        service_type, file_name
    )
}

/// Register `file_name` in the matching master list unless already there
///
/// Returns `true` when a line was appended.
pub fn register_bouquet(channel_dir: &Path, file_name: &str) -> Result<bool> {
    let master = channel_dir.join(if is_radio(file_name) {
        MASTER_RADIO
    } else {
        MASTER_TV
    });

    let existing = match fs::read_to_string(&master) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::Io(e)),
    };

    if existing.contains(&format!("\"{}\"", file_name)) {
        debug!("{} already registered in {}", file_name, master.display());
        return Ok(false);
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&master)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.write_all(reference_line(file_name).as_bytes())?;
    info!("Registered {} in {}", file_name, master.display());
    Ok(true)
}

/// Bouquet file names referenced by a master list, in file order
pub fn referenced_bouquets(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once("FROM BOUQUET \"")?;
            let (name, _) = rest.split_once('"')?;
            Some(name.to_string())
        })
        .collect()
}

/// Fold a repository master list into the receiver's one
///
/// The live list is only ever appended to. When it does not exist yet it
/// is seeded with the repository copy. Returns the number of references
/// added.
pub fn merge_master_list(channel_dir: &Path, source: &Path, file_name: &str) -> Result<usize> {
    let live = channel_dir.join(if file_name.eq_ignore_ascii_case(MASTER_RADIO) {
        MASTER_RADIO
    } else {
        MASTER_TV
    });

    if !live.exists() {
        fs::copy(source, &live)?;
        restrict_permissions(&live)?;
        info!("Seeded {} from the repository", live.display());
        return Ok(0);
    }

    let content = fs::read_to_string(source)?;
    let mut added = 0;
    for name in referenced_bouquets(&content) {
        if register_bouquet(channel_dir, &name)? {
            added += 1;
        }
    }
    Ok(added)
}

/// Copy selected bouquet files out of a repository snapshot
pub struct BouquetInstallJob {
    pub snapshot: RepoSnapshot,
    /// Snapshot item identifiers in selection order
    pub selected: Vec<String>,
    pub channel_dir: PathBuf,
    pub reloader: Box<dyn ServiceReloader>,
}

impl Job for BouquetInstallJob {
    type Output = InstallSummary;

    fn name(&self) -> &'static str {
        "bouquet-install"
    }

    fn run(self, ctx: &TaskContext) -> Result<InstallSummary> {
        let BouquetInstallJob {
            snapshot,
            selected,
            channel_dir,
            reloader,
        } = self;

        fs::create_dir_all(&channel_dir)?;

        let mut summary = run_batch(ctx, &selected, |id| id.clone(), |_, id| {
            let item = snapshot.item(id).ok_or_else(|| {
                Error::NotFoundError(format!("{} is not part of the downloaded repository", id))
            })?;

            if is_master_list(&item.name) {
                let added = merge_master_list(&channel_dir, &item.path, &item.name)?;
                return Ok(format!("{} (merged, {} new entries)", item.name, added));
            }

            let dest = channel_dir.join(&item.name);
            fs::copy(&item.path, &dest)?;
            restrict_permissions(&dest)?;

            if register_bouquet(&channel_dir, &item.name)? {
                Ok(format!("{} (registered)", item.name))
            } else {
                Ok(item.name.clone())
            }
        })?;

        if let Err(e) = snapshot.close() {
            warn!("Failed to remove repository snapshot: {}", e);
        }

        if summary.succeeded() > 0
            && let Some(caveat) = reload_caveat(reloader.as_ref())
        {
            summary.add_caveat(caveat);
        }
        Ok(summary)
    }
}
