//! The tri-state result every repository read emits.
//!
//! A read pipeline yields [`Resource::Loading`] first and then exactly one
//! terminal state. An [`Resource::Error`] that carries `stale_data` means
//! "the network failed, here is what the cache had": render the data with a
//! non-blocking warning instead of a blocking error screen.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Where successful data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Fresh from the remote API (and now cached).
    Network,
    /// From the local cache.
    Cache,
}

/// Why a read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No connectivity.
    NetworkUnavailable,
    /// The remote call failed.
    Remote,
    /// The record does not exist.
    NotFound,
    /// The local cache failed.
    Storage,
}

/// Loading, success, or error with optional stale data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resource<T> {
    /// The read is in progress.
    Loading,
    /// The read completed.
    Success { data: T, origin: Origin },
    /// The read failed.
    Error {
        kind: FailureKind,
        message: String,
        /// Cached data to show alongside the error, if any.
        stale_data: Option<T>,
    },
}

/// Stream of read states: `Loading`, then one terminal state.
pub type ResourceStream<T> = BoxStream<'static, Resource<T>>;

impl<T> Resource<T> {
    /// Successful network read.
    pub fn network(data: T) -> Self {
        Resource::Success {
            data,
            origin: Origin::Network,
        }
    }

    /// Successful cache read.
    pub fn cached(data: T) -> Self {
        Resource::Success {
            data,
            origin: Origin::Cache,
        }
    }

    /// Failure with nothing to show.
    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        Resource::Error {
            kind,
            message: message.into(),
            stale_data: None,
        }
    }

    /// Failure with cached data to show.
    pub fn stale(kind: FailureKind, message: impl Into<String>, data: T) -> Self {
        Resource::Error {
            kind,
            message: message.into(),
            stale_data: Some(data),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    /// Whether this is the final state of a read.
    pub fn is_terminal(&self) -> bool {
        !self.is_loading()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success { .. })
    }

    /// Data of a successful read.
    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Consume into the data of a successful read.
    pub fn into_data(self) -> Option<T> {
        match self {
            Resource::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// What the UI should show: the data of a success, or the stale data of
    /// an error.
    pub fn display_data(&self) -> Option<&T> {
        match self {
            Resource::Success { data, .. } => Some(data),
            Resource::Error { stale_data, .. } => stale_data.as_ref(),
            Resource::Loading => None,
        }
    }

    /// Consume into whatever [`Resource::display_data`] would show.
    pub fn into_display_data(self) -> Option<T> {
        match self {
            Resource::Success { data, .. } => Some(data),
            Resource::Error { stale_data, .. } => stale_data,
            Resource::Loading => None,
        }
    }

    /// An error with nothing to show.
    pub fn is_blocking_error(&self) -> bool {
        matches!(
            self,
            Resource::Error {
                stale_data: None,
                ..
            }
        )
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            Resource::Success { origin, .. } => Some(*origin),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Resource::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Resource::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Transform the payload, keeping the state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        match self {
            Resource::Loading => Resource::Loading,
            Resource::Success { data, origin } => Resource::Success {
                data: f(data),
                origin,
            },
            Resource::Error {
                kind,
                message,
                stale_data,
            } => Resource::Error {
                kind,
                message,
                stale_data: stale_data.map(f),
            },
        }
    }
}

impl<T> From<crate::Error> for Resource<T> {
    fn from(err: crate::Error) -> Self {
        Resource::error(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contract() {
        let fresh = Resource::network(vec![1]);
        let cached = Resource::cached(vec![1]);
        let stale = Resource::stale(FailureKind::NetworkUnavailable, "offline", vec![1]);
        let blocking: Resource<Vec<i32>> = Resource::error(FailureKind::Storage, "disk");

        // Every non-blocking state shows the same data
        for r in [&fresh, &cached, &stale] {
            assert_eq!(r.display_data(), Some(&vec![1]));
            assert!(!r.is_blocking_error());
        }
        assert!(blocking.is_blocking_error());
        assert!(blocking.display_data().is_none());

        assert_eq!(fresh.origin(), Some(Origin::Network));
        assert_eq!(cached.origin(), Some(Origin::Cache));
        assert!(stale.data().is_none());
    }

    #[test]
    fn test_loading_is_not_terminal() {
        let loading: Resource<()> = Resource::Loading;
        assert!(loading.is_loading());
        assert!(!loading.is_terminal());
        assert!(loading.display_data().is_none());
        assert!(!loading.is_blocking_error());
    }

    #[test]
    fn test_map_keeps_stale_data() {
        let stale = Resource::stale(FailureKind::Remote, "HTTP 500", vec![1, 2, 3]);
        let mapped = stale.map(|v| v.len());
        assert_eq!(mapped.display_data(), Some(&3));
        assert_eq!(mapped.failure_kind(), Some(FailureKind::Remote));
        assert_eq!(mapped.error_message(), Some("HTTP 500"));
    }

    #[test]
    fn test_from_error() {
        let resource: Resource<()> = crate::Error::not_found("place", 4).into();
        assert_eq!(resource.failure_kind(), Some(FailureKind::NotFound));
        assert!(resource.is_blocking_error());
    }

    #[test]
    fn test_serializes_with_state_tag() {
        let json = serde_json::to_value(Resource::cached(5)).unwrap();
        assert_eq!(json["state"], "success");
        assert_eq!(json["origin"], "cache");
    }
}
