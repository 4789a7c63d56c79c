//! Error types for campus-store.
//!
//! Every variant is a storage fault: the store never reports business-level
//! outcomes (a missing record is `Ok(None)`, not an error).

use std::path::PathBuf;

/// Result type for campus-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in campus-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
