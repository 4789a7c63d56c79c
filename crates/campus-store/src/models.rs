//! Bookkeeping types returned by the store.

use serde::Serialize;

use campus_types::{EntityId, EventDetail};

/// Result of a local event-detail write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWrite {
    /// The cache key the record was stored under. Negative for records the
    /// server has not confirmed yet.
    pub id: EntityId,
    /// Local revision after the write. Status updates compare against it so
    /// a push of an older revision never confirms a newer edit.
    pub revision: i64,
}

/// Outcome of confirming a pushed event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The pushed revision is current; the record is now `synced`.
    Synced,
    /// The record was edited after the push started. Its provisional key was
    /// replaced by the server id, and it still needs a push.
    Rekeyed,
    /// Nothing changed: the record is gone, or was edited and already had a
    /// server id.
    Stale,
}

/// An event detail waiting to be pushed, with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDetail {
    pub detail: EventDetail,
    pub revision: i64,
}

/// Row counts per cache table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    pub buildings: u64,
    pub places: u64,
    pub events: u64,
    pub event_details: u64,
    /// Event details not yet confirmed by the server.
    pub unsynced_details: u64,
    pub visits: u64,
    /// Visits not yet reported to the server.
    pub unsynced_visits: u64,
}
