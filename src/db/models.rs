// src/db/models.rs

//! Data models for persisted panel settings

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};

/// Key of the last-selected picon install directory
pub const PICON_DIR_KEY: &str = "picon_dir";

/// A single persisted setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

impl Setting {
    /// Find a setting by key
    pub fn find(conn: &Connection, key: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM settings WHERE key = ?1")?;
        let setting = stmt.query_row([key], Self::from_row).optional()?;
        Ok(setting)
    }

    /// Get a setting value
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        Ok(Self::find(conn, key)?.map(|s| s.value))
    }

    /// Insert or replace a setting value
    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Remove a setting
    pub fn delete(conn: &Connection, key: &str) -> Result<()> {
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: row.get(2)?,
        })
    }
}

/// Last picon directory chosen by the user, or `default` if none yet
pub fn picon_dir(conn: &Connection, default: &Path) -> Result<PathBuf> {
    Ok(Setting::get(conn, PICON_DIR_KEY)?
        .map(PathBuf::from)
        .unwrap_or_else(|| default.to_path_buf()))
}

/// Remember the picon directory for the next session
pub fn set_picon_dir(conn: &Connection, dir: &Path) -> Result<()> {
    Setting::set(conn, PICON_DIR_KEY, &dir.to_string_lossy())
}
