//! Sync event system.
//!
//! Every observable outcome of the engine (connectivity transitions, push
//! results, refreshed cache partitions) is published as a [`SyncEvent`] on a
//! single broadcast channel, so a UI can consume them from one place.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use campus_types::EntityId;

/// Cache partition refreshed from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Buildings,
    Places,
    Events,
    EventDetails,
}

/// Events emitted by the sync engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SyncEvent {
    /// Reachability changed.
    ConnectivityChanged { available: bool },
    /// A local edit was confirmed by the server.
    RecordSynced {
        /// Key the record had before the push (negative if provisional).
        local_id: EntityId,
        /// Server-assigned id the record is now stored under.
        id: EntityId,
    },
    /// A push attempt failed; the record is now `sync_error`.
    RecordSyncFailed { id: EntityId, error: String },
    /// A sync pass finished.
    PassCompleted {
        synced: usize,
        failed: usize,
        visits_synced: usize,
    },
    /// A network read replaced or extended a cache partition.
    CacheRefreshed { partition: Partition, count: usize },
}

/// Receiver for sync events.
pub type EventReceiver = broadcast::Receiver<SyncEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SyncEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_to_subscribers() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 1);

        dispatcher.send(SyncEvent::RecordSynced { local_id: -1, id: 42 });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::RecordSynced { local_id: -1, id: 42 }
        );
    }

    #[test]
    fn test_send_without_receivers_is_noop() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(SyncEvent::ConnectivityChanged { available: true });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(SyncEvent::CacheRefreshed {
            partition: Partition::Places,
            count: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "cache_refreshed");
        assert_eq!(json["partition"], "places");
    }
}
