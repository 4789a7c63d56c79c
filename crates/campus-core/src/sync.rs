//! Background delivery of local edits and visits.
//!
//! A pass re-queues failed records, pushes every `pending_sync` event detail
//! one by one, then reports unsynced visits. Passes run when connectivity
//! comes back and on a periodic timer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use campus_core::{Backend, SyncCoordinator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(backend: Backend) {
//! let coordinator = Arc::new(SyncCoordinator::new(backend));
//! let cancel = CancellationToken::new();
//! let handle = coordinator.spawn(Duration::from_secs(300), true, cancel.clone());
//!
//! // ...
//! cancel.cancel();
//! handle.await.ok();
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use campus_store::Table;
use campus_types::{EntityId, SyncStatus};

use crate::events::SyncEvent;
use crate::remote::with_timeout;
use crate::repo::{Backend, PushOutcome, push_detail};

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Server ids of records confirmed in this pass.
    pub synced: Vec<EntityId>,
    /// Cache keys of records whose push failed (now `sync_error`).
    pub failed: Vec<EntityId>,
    /// Records left for a later pass: edited during their push, or already
    /// being pushed elsewhere.
    pub deferred: usize,
    pub visits_synced: usize,
    pub visits_failed: usize,
    /// Cache operations that failed during the pass.
    pub storage_errors: usize,
    /// The device was offline; nothing was attempted.
    pub skipped: bool,
    /// Connectivity was lost mid-pass.
    pub interrupted: bool,
}

impl SyncReport {
    /// Whether the pass did anything worth reporting.
    pub fn is_empty(&self) -> bool {
        self.synced.is_empty()
            && self.failed.is_empty()
            && self.deferred == 0
            && self.visits_synced == 0
            && self.visits_failed == 0
            && self.storage_errors == 0
    }
}

/// Runs sync passes, one at a time.
#[derive(Debug)]
pub struct SyncCoordinator {
    backend: Backend,
    pass: AsyncMutex<()>,
    last_report: Mutex<Option<SyncReport>>,
}

impl SyncCoordinator {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            pass: AsyncMutex::new(()),
            last_report: Mutex::new(None),
        }
    }

    /// Report of the most recent pass.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one pass. Never fails; problems are counted in the report.
    ///
    /// A call made while another pass is running waits for it to finish.
    pub async fn run_once(&self) -> SyncReport {
        let _pass = self.pass.lock().await;
        let mut report = SyncReport::default();

        if !self.backend.monitor().is_available() {
            debug!("Offline, skipping sync pass");
            report.skipped = true;
            return report;
        }

        let cache = self.backend.cache();
        match cache.write(&[Table::EventDetails], |store| {
            store.requeue_failed_event_details()
        }) {
            Ok(ids) if !ids.is_empty() => debug!("Re-queued {} failed record(s)", ids.len()),
            Ok(_) => {}
            Err(e) => {
                error!("Failed to re-queue failed records: {}", e);
                report.storage_errors += 1;
            }
        }

        let pending = match cache.read(|store| {
            store.event_details_with_status(SyncStatus::PendingSync)
        }) {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to read pending records: {}", e);
                report.storage_errors += 1;
                Vec::new()
            }
        };

        for item in pending {
            if !self.backend.monitor().is_available() {
                info!("Connectivity lost, stopping sync pass");
                report.interrupted = true;
                break;
            }

            let local_id = item.detail.id();
            match push_detail(&self.backend, local_id, item.revision, &item.detail).await {
                PushOutcome::Synced { id } => report.synced.push(id),
                PushOutcome::Failed { .. } => report.failed.push(local_id),
                PushOutcome::Superseded | PushOutcome::InFlight => report.deferred += 1,
                PushOutcome::StorageFault { .. } => report.storage_errors += 1,
            }
        }

        if !report.interrupted {
            self.flush_visits(&mut report).await;
        }

        self.backend.events().send(SyncEvent::PassCompleted {
            synced: report.synced.len(),
            failed: report.failed.len(),
            visits_synced: report.visits_synced,
        });

        if report.is_empty() {
            debug!("Sync pass finished, nothing to do");
        } else {
            info!(
                "Sync pass finished: {} synced, {} failed, {} deferred, {} visit(s) reported",
                report.synced.len(),
                report.failed.len(),
                report.deferred,
                report.visits_synced
            );
        }

        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }

    async fn flush_visits(&self, report: &mut SyncReport) {
        let cache = self.backend.cache();
        let visits = match cache.read(|store| store.unsynced_visits()) {
            Ok(visits) => visits,
            Err(e) => {
                error!("Failed to read unsynced visits: {}", e);
                report.storage_errors += 1;
                return;
            }
        };

        let timeout = self.backend.config().push_timeout;
        for visit in visits {
            if !self.backend.monitor().is_available() {
                report.interrupted = true;
                break;
            }

            let pushed =
                with_timeout("push visit", timeout, self.backend.remote().push_visit(&visit)).await;
            match pushed {
                Ok(()) => {
                    match cache.write(&[Table::Visits], |store| store.mark_visit_synced(visit.id)) {
                        Ok(_) => report.visits_synced += 1,
                        Err(e) => {
                            error!("Failed to mark visit {} synced: {}", visit.id, e);
                            report.storage_errors += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to report visit {}: {}", visit.id, e);
                    report.visits_failed += 1;
                }
            }
        }
    }

    /// Run passes in the background until `cancel` fires.
    ///
    /// A pass starts whenever connectivity becomes available (including
    /// right away if it already is) and every `interval` after the last
    /// wake-up. With `jitter`, each wait is stretched by up to a tenth of
    /// `interval`.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        jitter: bool,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Sync coordinator started (interval {:?})", interval);
            let mut states = self.backend.monitor().observe();
            let mut online: Option<bool> = None;

            loop {
                let wait = next_wait(interval, jitter);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    state = states.next() => {
                        let Some(available) = state else { break };
                        let previous = online.replace(available);
                        if previous.is_some() {
                            self.backend
                                .events()
                                .send(SyncEvent::ConnectivityChanged { available });
                        }
                        if available && previous != Some(true) {
                            self.run_once().await;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {
                        self.run_once().await;
                    }
                }
            }

            info!("Sync coordinator stopped");
        })
    }
}

fn next_wait(interval: Duration, jitter: bool) -> Duration {
    let spread = (interval / 10).as_millis() as u64;
    if !jitter || spread == 0 {
        return interval;
    }
    interval + Duration::from_millis(rand::rng().random_range(0..=spread))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn next_wait_stays_within_a_tenth(secs in 1u64..=86_400, jitter: bool) {
            let interval = Duration::from_secs(secs);
            let wait = next_wait(interval, jitter);
            prop_assert!(wait >= interval);
            prop_assert!(wait <= interval + interval / 10);
            if !jitter {
                prop_assert_eq!(wait, interval);
            }
        }
    }
}
