// src/discovery/mod.rs

//! List workers: find out what can be installed
//!
//! Three sources are supported:
//! - HTML directory listings (picon packs)
//! - repository snapshot archives (bouquets, skins, plugins)
//! - opkg package indexes (feed packages)

pub mod listing;
pub mod packages;
pub mod repo;

use std::collections::HashSet;

/// One installable item of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Unique identifier handed back to the install worker
    pub id: String,
    /// Human-readable name shown in the selection list
    pub name: String,
}

impl ListingEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ordered listing of installable items
///
/// Identifiers are unique and entries are sorted case-insensitively by
/// display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing {
    entries: Vec<ListingEntry>,
}

impl RemoteListing {
    /// Build a listing, dropping repeated identifiers (first one wins)
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ListingEntry>,
    {
        let mut seen = HashSet::new();
        let mut entries: Vec<ListingEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect();
        entries.sort_by_cached_key(|e| (e.name.to_lowercase(), e.id.clone()));
        Self { entries }
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&ListingEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Find an entry by identifier or by (case-insensitive) display name
    pub fn lookup(&self, key: &str) -> Option<&ListingEntry> {
        self.get(key)
            .or_else(|| self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(key)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
