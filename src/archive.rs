// src/archive.rs

//! Zip extraction that cannot write outside its destination
//!
//! Every archive that reaches the filesystem goes through
//! [`extract_member`]. Member names are resolved lexically against the
//! destination directory; a name that would land outside it (`..` escaping
//! the root, absolute paths, drive prefixes) fails the whole archive with
//! [`Error::UnsafePath`].

use crate::error::{Error, Result};
use crate::worker::TaskContext;
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Open a zip archive from disk
pub fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| {
        Error::ArchiveError(format!("Failed to open archive {}: {}", path.display(), e))
    })
}

/// Normalize an archive member name into a relative path
///
/// `.` and empty segments are dropped and `..` removes the previous
/// segment. Returns `Ok(None)` for names that normalize to nothing.
pub fn normalize_member_path(name: &str) -> Result<Option<PathBuf>> {
    let unsafe_path = || Error::UnsafePath {
        member: name.to_string(),
    };

    if name.starts_with('/') || name.starts_with('\\') {
        return Err(unsafe_path());
    }

    let mut segments: Vec<&str> = Vec::new();
    for (i, segment) in name.split(['/', '\\']).enumerate() {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(unsafe_path());
                }
            }
            s if i == 0 && is_drive_prefix(s) => return Err(unsafe_path()),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Ok(None);
    }
    Ok(Some(segments.iter().collect()))
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve a member name to its absolute destination path
///
/// The candidate must equal the destination directory or lie below it.
pub fn resolve_member_path(dest: &Path, name: &str) -> Result<Option<PathBuf>> {
    let relative = match normalize_member_path(name)? {
        Some(relative) => relative,
        None => return Ok(None),
    };

    let root = std::path::absolute(dest)?;
    let candidate = root.join(&relative);

    if candidate != root && !candidate.starts_with(&root) {
        return Err(Error::UnsafePath {
            member: name.to_string(),
        });
    }
    Ok(Some(candidate))
}

/// True for hidden files and macOS metadata (`__MACOSX/`, `.DS_Store`, `._*`)
pub fn is_metadata_entry(name: &str) -> bool {
    let Some(last) = name.split(['/', '\\']).filter(|s| !s.is_empty()).last() else {
        return false;
    };
    let in_macosx = name
        .split(['/', '\\'])
        .any(|s| s.eq_ignore_ascii_case("__MACOSX"));
    in_macosx || last.starts_with('.')
}

fn is_directory_entry(name: &str) -> bool {
    name.ends_with('/') || name.ends_with('\\')
}

/// Check every member name before anything is written
pub fn validate_members<R: Read + Seek>(archive: &ZipArchive<R>, dest: &Path) -> Result<()> {
    for name in archive.file_names() {
        resolve_member_path(dest, name)?;
    }
    Ok(())
}

/// Extract one member into `dest`
///
/// Returns the written file, or `None` when the member was skipped
/// (directory, metadata entry, empty name).
pub fn extract_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    dest: &Path,
) -> Result<Option<PathBuf>> {
    let mut member = archive.by_index(index)?;
    let name = member.name().to_string();

    let target = match resolve_member_path(dest, &name)? {
        Some(target) => target,
        None => return Ok(None),
    };

    if member.is_dir() || is_directory_entry(&name) || is_metadata_entry(&name) {
        debug!("Skipping archive entry {}", name);
        return Ok(None);
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = File::create(&target)?;
    io::copy(&mut member, &mut out)?;
    Ok(Some(target))
}

/// Extract every member of the archive into `dest`
///
/// All names are validated first, so an archive holding a single unsafe
/// member writes nothing. Cancellation is checked between members.
pub fn extract_all<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest: &Path,
    ctx: &TaskContext,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    validate_members(archive, dest)?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        ctx.checkpoint()?;
        if let Some(path) = extract_member(archive, index, dest)? {
            written.push(path);
        }
    }

    info!("Extracted {} files into {}", written.len(), dest.display());
    Ok(written)
}
