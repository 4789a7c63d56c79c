//! Error types for campus-core.
//!
//! # Recovery
//!
//! | Error Type | Recovery | Surfaced to the UI |
//! |------------|----------|--------------------|
//! | [`Error::NetworkUnavailable`] | Fall back to cache | Only when the cache has nothing |
//! | [`Error::Remote`] | Fall back to cache | Only when the cache has nothing |
//! | [`Error::NotFound`] | None, the record does not exist | Always, as a typed outcome |
//! | [`Error::Storage`] | None, the fallback layer is broken | Always |
//! | [`Error::InvalidConfig`] | Fix configuration and restart | At startup |
//!
//! Push failures never appear here: the sync coordinator records them as
//! status transitions on the affected record.

use thiserror::Error;

use campus_types::EntityId;

use crate::remote::RemoteError;
use crate::resource::FailureKind;

/// Errors that can occur in the sync engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No connectivity.
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// The remote API answered with an error, or the call failed in transit.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The remote API answered, but has no such record.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (e.g. "building").
        entity: &'static str,
        /// The requested id.
        id: EntityId,
    },

    /// The local cache failed.
    #[error("Storage error: {0}")]
    Storage(#[from] campus_store::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: EntityId) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether a cache read can stand in for the failed operation.
    pub fn is_recoverable_by_cache(&self) -> bool {
        matches!(self, Error::NetworkUnavailable | Error::Remote(_))
    }

    /// The failure class reported in a [`Resource::Error`](crate::Resource::Error).
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::NetworkUnavailable => FailureKind::NetworkUnavailable,
            Error::Remote(_) => FailureKind::Remote,
            Error::NotFound { .. } => FailureKind::NotFound,
            // Local faults block like a broken cache
            Error::Storage(_) | Error::InvalidConfig(_) => FailureKind::Storage,
        }
    }
}

/// Result type alias using campus-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
