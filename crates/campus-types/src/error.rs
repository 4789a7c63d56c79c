//! Error types for value parsing in campus-types.

use thiserror::Error;

/// Errors that can occur when parsing stored or transferred values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The event type is not one of the supported categories.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The sync status label is not recognized.
    #[error("Unknown sync status: {0}")]
    UnknownSyncStatus(String),
}

/// Result type alias using campus-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
