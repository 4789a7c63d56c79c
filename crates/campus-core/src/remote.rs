//! The remote data source contract.
//!
//! The REST API is an external collaborator. This module only fixes the
//! shape of the calls the sync engine makes; [`MockRemote`](crate::MockRemote)
//! and, with the `http-client` feature, [`HttpRemote`](crate::HttpRemote)
//! implement it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use campus_types::{
    Building, EntityId, Event, EventDetailPayload, EventType, PlacePayload, VisitedItem,
};

/// Failure of a single remote call.
///
/// Both variants mean "the network could not answer this call" to the read
/// path, which falls back to the cache either way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),
}

impl RemoteError {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: &str, duration: Duration) -> Self {
        Self::Network(format!("{} timed out after {:?}", operation, duration))
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Run a remote call with an upper bound on its duration.
pub async fn with_timeout<T, F>(operation: &str, duration: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(duration, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::timeout(operation, duration)),
    }
}

/// Calls the sync engine makes against the campus API.
///
/// Point lookups return `Ok(None)` when the API legitimately has no such
/// record (HTTP 404 included). That outcome is not a failure to fall back
/// from.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    // --- Buildings ---

    async fn list_buildings(&self) -> RemoteResult<Vec<Building>>;

    async fn get_building(&self, id: EntityId) -> RemoteResult<Option<Building>>;

    async fn buildings_by_category(&self, category: &str) -> RemoteResult<Vec<Building>>;

    async fn search_buildings(&self, text: &str) -> RemoteResult<Vec<Building>>;

    // --- Places ---

    async fn list_places(&self) -> RemoteResult<Vec<PlacePayload>>;

    async fn get_place(&self, id: EntityId) -> RemoteResult<Option<PlacePayload>>;

    async fn places_by_building(&self, building_id: EntityId) -> RemoteResult<Vec<PlacePayload>>;

    async fn places_by_category(&self, category: &str) -> RemoteResult<Vec<PlacePayload>>;

    async fn search_places(&self, text: &str) -> RemoteResult<Vec<PlacePayload>>;

    // --- Events ---

    async fn list_events(&self) -> RemoteResult<Vec<Event>>;

    async fn get_event(&self, id: EntityId) -> RemoteResult<Option<Event>>;

    async fn events_by_type(&self, event_type: EventType) -> RemoteResult<Vec<Event>>;

    async fn search_events(&self, text: &str) -> RemoteResult<Vec<Event>>;

    // --- Event details ---

    async fn get_event_detail(&self, id: EntityId) -> RemoteResult<Option<EventDetailPayload>>;

    /// Push a local edit. A payload with id 0 creates a new record. Returns
    /// the id the server stored it under.
    async fn push_event_detail(&self, detail: &EventDetailPayload) -> RemoteResult<EntityId>;

    // --- Visits ---

    /// Report a visit from the local log.
    async fn push_visit(&self, visit: &VisitedItem) -> RemoteResult<()>;
}
