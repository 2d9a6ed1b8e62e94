// src/error.rs

use thiserror::Error;

/// Core error types for stbpanel
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Initialization error (HTTP client, database, worker thread)
    #[error("Failed to initialize: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Transport failure: DNS, connect, timeout or HTTP error status
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Archive member resolving outside the extraction directory
    #[error("Unsafe path in archive: {member}")]
    UnsafePath { member: String },

    /// Corrupt or unreadable archive
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// The server answered but the expected content is not there
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Malformed package index, playlist or descriptor
    #[error("Parse error: {0}")]
    ParseError(String),

    /// External package tool failed or timed out
    #[error("Command failed: {0}")]
    CommandError(String),

    /// Host channel-list reload failed
    #[error("Reload failed: {0}")]
    ReloadError(String),

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// True when this error only signals that the operation was cancelled
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::ArchiveError(other.to_string()),
        }
    }
}

/// Result type alias using stbpanel's Error type
pub type Result<T> = std::result::Result<T, Error>;
