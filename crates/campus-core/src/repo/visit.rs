//! Local audit log of visited events.

use campus_store::{LiveQuery, Table};
use campus_types::{EntityId, VisitedItem};
use time::OffsetDateTime;

use super::Backend;
use crate::error::Result;

/// Append-only log of event visits.
///
/// Recording never touches the network; the sync coordinator reports
/// entries later and only ever flips their `was_synced` flag.
#[derive(Debug, Clone)]
pub struct VisitLog {
    backend: Backend,
}

impl VisitLog {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Append a visit, timestamped now.
    pub fn record(&self, event_id: EntityId, title: &str) -> Result<VisitedItem> {
        Ok(self.backend.cache().write(&[Table::Visits], |store| {
            store.append_visit(event_id, title, OffsetDateTime::now_utc())
        })?)
    }

    /// Newest visits first.
    pub fn recent(&self, limit: Option<u32>) -> Result<Vec<VisitedItem>> {
        Ok(self.backend.cache().read(|store| store.list_visits(limit))?)
    }

    /// Visits not yet reported, oldest first.
    pub fn unsynced(&self) -> Result<Vec<VisitedItem>> {
        Ok(self.backend.cache().read(|store| store.unsynced_visits())?)
    }

    pub fn observe(&self, limit: Option<u32>) -> LiveQuery<Vec<VisitedItem>> {
        self.backend.cache().watch_visits(limit)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::mock::MockRemote;
    use crate::repo::testing::backend;

    #[tokio::test]
    async fn test_record_is_local_only() {
        let (backend, remote) = backend(MockRemote::new(), true);
        let log = VisitLog::new(backend);

        let first = log.record(5, "Hackathon").unwrap();
        log.record(6, "Cine club").unwrap();

        assert!(!first.was_synced);
        assert_eq!(log.unsynced().unwrap().len(), 2);
        assert_eq!(log.recent(Some(1)).unwrap().len(), 1);
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_observe_sees_new_visits() {
        let (backend, _) = backend(MockRemote::new(), false);
        let log = VisitLog::new(backend);
        let mut live = log.observe(None);

        assert!(live.next().await.unwrap().unwrap().is_empty());
        log.record(5, "Hackathon").unwrap();
        let visits = live.next().await.unwrap().unwrap();
        assert_eq!(visits[0].event_id, 5);
    }
}
