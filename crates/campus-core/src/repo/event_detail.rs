//! Editable event details: offline-first reads and the local write path.
//!
//! A save is persisted before anything touches the network. When the device
//! is online the push runs as a detached task, so dropping the returned
//! [`PendingWrite`] never cancels it. Records the push could not deliver are
//! left to the [`SyncCoordinator`](crate::SyncCoordinator).

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use campus_store::{Confirmation, LiveQuery, Table};
use campus_types::{EntityId, EventDetail, EventDetailPayload, SyncStatus, UNSAVED_ID};

use super::{Backend, loading_then};
use crate::error::{Error, Result};
use crate::events::{Partition, SyncEvent};
use crate::remote::{RemoteError, with_timeout};
use crate::resource::{FailureKind, Resource, ResourceStream};

/// How a single push attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The server confirmed the record; it is now stored under `id`.
    Synced { id: EntityId },
    /// The push failed; the record is now `sync_error`.
    Failed { error: String },
    /// The record changed (or vanished) while the push was in flight; its
    /// status was left for the next push.
    Superseded,
    /// Another push of the same record was already running.
    InFlight,
    /// The cache could not record the outcome.
    StorageFault { error: String },
}

/// A saved local edit, and the push started for it.
#[derive(Debug)]
pub struct PendingWrite {
    /// The record as stored, under its cache key.
    pub record: EventDetail,
    /// Local revision of the write.
    pub revision: i64,
    push: Option<JoinHandle<PushOutcome>>,
}

impl PendingWrite {
    /// Whether a push was started (the device was online).
    pub fn is_pushing(&self) -> bool {
        self.push.is_some()
    }

    /// Wait for the push to finish. `None` if none was started.
    pub async fn settled(self) -> Option<PushOutcome> {
        let push = self.push?;
        Some(push.await.unwrap_or_else(|e| PushOutcome::Failed {
            error: format!("push task failed: {}", e),
        }))
    }
}

/// Offline-first access to event details, plus local editing.
#[derive(Debug, Clone)]
pub struct EventDetailRepository {
    backend: Backend,
}

impl EventDetailRepository {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Read a detail. A local edit that is not yet synced always wins over
    /// the server copy.
    pub async fn fetch(&self, id: EntityId) -> Resource<EventDetail> {
        if id < UNSAVED_ID {
            // Provisional keys only exist locally
            return self.backend.fallback_one(
                "event detail",
                id,
                &Error::NetworkUnavailable,
                |store| store.get_event_detail(id),
            );
        }

        let operation = format!("get event detail {}", id);
        let remote = self.backend.remote();
        let cause = match self
            .backend
            .call_remote(&operation, remote.get_event_detail(id))
            .await
        {
            None => Error::NetworkUnavailable,
            Some(Ok(Some(payload))) if payload.event.id > UNSAVED_ID => {
                return self.store_fetched(EventDetail::from_remote(payload));
            }
            Some(Ok(Some(_))) => {
                warn!("{}: response carried no server id", operation);
                Error::Remote(RemoteError::Network(
                    "response record has no server id".to_string(),
                ))
            }
            Some(Ok(None)) => return self.local_only(id),
            Some(Err(e)) => {
                warn!("{}: remote failed, falling back to cache: {}", operation, e);
                Error::Remote(e)
            }
        };

        self.backend
            .fallback_one("event detail", id, &cause, |store| store.get_event_detail(id))
    }

    fn store_fetched(&self, detail: EventDetail) -> Resource<EventDetail> {
        let id = detail.id();
        let written = self.backend.cache().write(&[Table::EventDetails], |store| {
            store.store_remote_event_detail(&detail)
        });

        match written {
            Ok(true) => {
                self.backend.events().send(SyncEvent::CacheRefreshed {
                    partition: Partition::EventDetails,
                    count: 1,
                });
                Resource::network(detail)
            }
            Ok(false) => match self.backend.cache().read(|store| store.get_event_detail(id)) {
                Ok(Some(local)) => Resource::cached(local),
                Ok(None) => Resource::network(detail),
                Err(e) => Error::from(e).into(),
            },
            Err(e) => {
                error!("get event detail {}: failed to cache network result: {}", id, e);
                Resource::stale(FailureKind::Storage, Error::from(e).to_string(), detail)
            }
        }
    }

    /// The server has no such record: only an unsynced local edit remains.
    fn local_only(&self, id: EntityId) -> Resource<EventDetail> {
        match self.backend.cache().read(|store| store.get_event_detail(id)) {
            Ok(Some(local)) if local.last_sync_status.needs_push() => Resource::cached(local),
            Ok(_) => Error::not_found("event detail", id).into(),
            Err(e) => Error::from(e).into(),
        }
    }

    pub fn get(&self, id: EntityId) -> ResourceStream<EventDetail> {
        let repo = self.clone();
        loading_then(async move { repo.fetch(id).await })
    }

    /// Save a local edit.
    ///
    /// The record is stored as `pending_sync` right away (id 0 gets a
    /// provisional negative key). If the device is online and a Tokio
    /// runtime is running, a push is spawned; its outcome is available
    /// through [`PendingWrite::settled`].
    pub fn save(&self, payload: EventDetailPayload) -> Result<PendingWrite> {
        let detail = EventDetail::local_edit(payload);
        let write = self
            .backend
            .cache()
            .write(&[Table::EventDetails], |store| store.upsert_event_detail(&detail))?;

        let mut record = detail;
        record.event.id = write.id;
        debug!("Saved event detail {} (revision {})", write.id, write.revision);

        let push = if self.backend.monitor().is_available() {
            match Handle::try_current() {
                Ok(runtime) => {
                    let backend = self.backend.clone();
                    let pushed = record.clone();
                    Some(runtime.spawn(async move {
                        push_detail(&backend, write.id, write.revision, &pushed).await
                    }))
                }
                Err(_) => {
                    warn!(
                        "No async runtime; event detail {} left for the next sync pass",
                        write.id
                    );
                    None
                }
            }
        } else {
            debug!("Offline; event detail {} queued", write.id);
            None
        };

        Ok(PendingWrite {
            record,
            revision: write.revision,
            push,
        })
    }

    /// Every local edit that still has to reach the server.
    pub fn unsynced(&self) -> Result<Vec<EventDetail>> {
        let details = self.backend.cache().read(|store| store.list_event_details())?;
        Ok(details
            .into_iter()
            .filter(|d| d.last_sync_status.needs_push())
            .collect())
    }

    pub fn observe(&self, id: EntityId) -> LiveQuery<Option<EventDetail>> {
        self.backend.cache().watch_event_detail(id)
    }

    pub fn observe_all(&self) -> LiveQuery<Vec<EventDetail>> {
        self.backend.cache().watch_event_details()
    }
}

/// Push one record at one revision and record the outcome.
///
/// Holds the record's lock for the whole attempt. Status updates are
/// compare-and-set on `revision`, so an edit saved during the push is never
/// marked synced.
pub(crate) async fn push_detail(
    backend: &Backend,
    local_id: EntityId,
    revision: i64,
    detail: &EventDetail,
) -> PushOutcome {
    let Some(_guard) = backend.locks().try_lock(local_id) else {
        debug!("Event detail {} is already being pushed", local_id);
        return PushOutcome::InFlight;
    };

    let mut payload = detail.to_payload();
    payload.event.id = local_id.max(UNSAVED_ID);

    let pushed = with_timeout(
        "push event detail",
        backend.config().push_timeout,
        backend.remote().push_event_detail(&payload),
    )
    .await;

    let server_id = match pushed {
        Ok(id) if id > UNSAVED_ID => id,
        Ok(_) if local_id > UNSAVED_ID => local_id,
        Ok(_) => {
            return record_failure(backend, local_id, revision, "server assigned no id".to_string());
        }
        Err(e) => return record_failure(backend, local_id, revision, e.to_string()),
    };

    let confirmed = backend.cache().write(&[Table::EventDetails], |store| {
        store.confirm_event_detail(local_id, revision, server_id)
    });

    match confirmed {
        Ok(Confirmation::Synced) => {
            info!("Event detail {} synced as {}", local_id, server_id);
            backend.events().send(SyncEvent::RecordSynced {
                local_id,
                id: server_id,
            });
            PushOutcome::Synced { id: server_id }
        }
        Ok(Confirmation::Rekeyed) => {
            debug!(
                "Event detail {} edited during push; now keyed {}",
                local_id, server_id
            );
            PushOutcome::Superseded
        }
        Ok(Confirmation::Stale) => {
            debug!("Event detail {} changed during push", local_id);
            PushOutcome::Superseded
        }
        Err(e) => {
            error!("Failed to confirm event detail {}: {}", local_id, e);
            PushOutcome::StorageFault {
                error: e.to_string(),
            }
        }
    }
}

fn record_failure(
    backend: &Backend,
    local_id: EntityId,
    revision: i64,
    error: String,
) -> PushOutcome {
    warn!("Push of event detail {} failed: {}", local_id, error);

    let moved = backend.cache().write(&[Table::EventDetails], |store| {
        store.transition_event_detail(
            local_id,
            Some(revision),
            SyncStatus::PendingSync,
            SyncStatus::SyncError,
        )
    });

    match moved {
        Ok(true) => {
            backend.events().send(SyncEvent::RecordSyncFailed {
                id: local_id,
                error: error.clone(),
            });
            PushOutcome::Failed { error }
        }
        Ok(false) => PushOutcome::Superseded,
        Err(e) => {
            error!("Failed to flag event detail {}: {}", local_id, e);
            PushOutcome::StorageFault {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockRemote, Operation};
    use crate::repo::testing::backend;
    use crate::resource::Origin;
    use campus_types::Event;

    fn payload(id: EntityId, title: &str) -> EventDetailPayload {
        EventDetailPayload {
            event: Event {
                id,
                title: title.to_string(),
                start_time: "2024-04-01T09:00:00Z".to_string(),
                end_time: "2024-04-02T09:00:00Z".to_string(),
                ..Default::default()
            },
            organizer_name: Some("Sistemas".to_string()),
            capacity: Some(120),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_offline_save_stays_pending() {
        let (backend, remote) = backend(MockRemote::new(), false);
        let repo = EventDetailRepository::new(backend);

        let write = repo.save(payload(5, "Hackathon")).unwrap();
        assert!(!write.is_pushing());
        assert!(write.settled().await.is_none());

        let read = repo.fetch(5).await;
        assert_eq!(read.origin(), Some(Origin::Cache));
        assert_eq!(read.data().unwrap().last_sync_status, SyncStatus::PendingSync);
        assert_eq!(remote.call_count(Operation::PushEventDetail), 0);
    }

    #[tokio::test]
    async fn test_online_save_pushes_and_rekeys() {
        let (backend, remote) = backend(MockRemote::new(), true);
        let repo = EventDetailRepository::new(backend.clone());
        let mut events = backend.events().subscribe();

        let write = repo.save(payload(0, "Nueva charla")).unwrap();
        assert!(write.record.event.id < 0);
        let local_id = write.record.event.id;

        assert_eq!(write.settled().await, Some(PushOutcome::Synced { id: 1000 }));

        let stored = backend.cache().read(|s| s.get_event_detail(1000)).unwrap().unwrap();
        assert_eq!(stored.last_sync_status, SyncStatus::Synced);
        assert!(backend.cache().read(|s| s.get_event_detail(local_id)).unwrap().is_none());
        assert_eq!(remote.call_count(Operation::PushEventDetail), 1);
        assert_eq!(remote.pushed_details().await[0].event.title, "Nueva charla");
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::RecordSynced { local_id, id: 1000 }
        );
    }

    #[tokio::test]
    async fn test_failed_push_marks_sync_error() {
        let remote = MockRemote::new();
        remote.fail_push_for(7);
        let (backend, _) = backend(remote, true);
        let repo = EventDetailRepository::new(backend);

        let write = repo.save(payload(7, "Semana de la ingeniería")).unwrap();
        assert!(matches!(write.settled().await, Some(PushOutcome::Failed { .. })));

        let unsynced = repo.unsynced().unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].last_sync_status, SyncStatus::SyncError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_push_is_not_marked_synced() {
        let remote = MockRemote::builder()
            .latency(Duration::from_millis(200))
            .build();
        let (backend, _) = backend(remote, true);
        let repo = EventDetailRepository::new(backend.clone());

        let first = repo.save(payload(9, "Version 1")).unwrap();
        // Second edit lands while the first push is still in flight
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = repo.save(payload(9, "Version 2")).unwrap();

        assert_eq!(first.settled().await, Some(PushOutcome::Superseded));
        assert_eq!(second.settled().await, Some(PushOutcome::InFlight));

        let stored = backend.cache().read(|s| s.get_event_detail(9)).unwrap().unwrap();
        assert_eq!(stored.event.title, "Version 2");
        assert_eq!(stored.last_sync_status, SyncStatus::PendingSync);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_push_keeps_new_edit_pending() {
        let remote = MockRemote::builder()
            .latency(Duration::from_millis(200))
            .build();
        let (backend, remote) = backend(remote, true);
        let repo = EventDetailRepository::new(backend.clone());

        let first = repo.save(payload(5, "Old content")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Cache wiped and the record re-created while the old push is in flight
        backend.cache().reset().unwrap();
        backend.monitor().report(false);
        let second = repo.save(payload(5, "New content, never pushed")).unwrap();
        assert!(second.revision > first.revision);

        assert_eq!(first.settled().await, Some(PushOutcome::Superseded));

        let stored = backend.cache().read(|s| s.get_event_detail(5)).unwrap().unwrap();
        assert_eq!(stored.event.title, "New content, never pushed");
        assert_eq!(stored.last_sync_status, SyncStatus::PendingSync);
        let pushed = remote.pushed_details().await;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].event.title, "Old content");
    }

    #[tokio::test]
    async fn test_remote_copy_does_not_clobber_local_edit() {
        let remote = MockRemote::builder()
            .event_detail(payload(3, "Server title"))
            .build();
        let (backend, _) = backend(remote, false);
        let repo = EventDetailRepository::new(backend.clone());

        repo.save(payload(3, "Local title")).unwrap();
        backend.monitor().report(true);

        let read = repo.fetch(3).await;
        assert_eq!(read.origin(), Some(Origin::Cache));
        assert_eq!(read.data().unwrap().event.title, "Local title");
    }

    #[tokio::test]
    async fn test_fetch_remote_detail_is_cached_as_synced() {
        let remote = MockRemote::builder()
            .event_detail(payload(4, "Hackathon"))
            .build();
        let (backend, _) = backend(remote, true);
        let repo = EventDetailRepository::new(backend.clone());

        let read = repo.fetch(4).await;
        assert_eq!(read.origin(), Some(Origin::Network));

        backend.monitor().report(false);
        let offline = repo.fetch(4).await;
        assert_eq!(offline.data().unwrap().last_sync_status, SyncStatus::Synced);
        assert_eq!(repo.fetch(99).await.failure_kind(), Some(FailureKind::NotFound));
    }
}
