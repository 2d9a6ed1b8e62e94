// src/lib.rs

//! stbpanel: add-on installer for set-top-boxes
//!
//! Background workers that fetch remote listings and archives, extract them
//! safely, and install picons, bouquets, skins, EPG sources and package feeds
//! into a live receiver configuration tree.
//!
//! # Architecture
//!
//! - Workers: one thread per operation, reporting to a single-threaded
//!   foreground through a channel drained once per tick
//! - Cancellation: cooperative, checked between items and per transfer chunk
//! - Extraction: every archive member passes the zip-slip check
//! - Settings: the last picon directory lives in SQLite; directories and
//!   URLs come from [`config::PanelConfig`]

mod error;
pub mod archive;
pub mod config;
pub mod convert;
pub mod db;
pub mod discovery;
pub mod host;
pub mod http;
pub mod install;
pub mod reload;
pub mod selection;
pub mod worker;

pub use error::{Error, Result};
