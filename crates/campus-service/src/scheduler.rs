//! Background sync scheduling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use campus_core::{EventReceiver, Registration, SyncEvent};

use crate::probe::TcpProbe;
use crate::state::AppState;

/// Number of failing passes logged at `warn` before going quiet.
const LOUD_FAILURES: u32 = 3;

/// Runs the connectivity probe, periodic sync passes and event logging.
pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the background tasks. Returns immediately.
    ///
    /// Everything stops when `cancel` fires or the returned handle is shut
    /// down.
    pub fn start(&self, cancel: CancellationToken) -> SchedulerHandle {
        let config = &self.state.config;
        let probe_interval = Duration::from_secs(config.connectivity.probe_interval_secs);
        let probe_timeout = Duration::from_secs(config.connectivity.probe_timeout_secs);

        let registration = match TcpProbe::from_base_url(&config.remote.base_url, probe_timeout) {
            Some(probe) => {
                info!(
                    "Probing {} every {}s",
                    probe.addr(),
                    config.connectivity.probe_interval_secs
                );
                Some(self.state.monitor.register(Arc::new(probe), probe_interval))
            }
            None => {
                warn!(
                    "Cannot derive a probe address from {}, assuming online",
                    config.remote.base_url
                );
                self.state.monitor.report(true);
                None
            }
        };

        let logger = tokio::spawn(log_events(
            self.state.backend.events().subscribe(),
            cancel.clone(),
        ));

        let sync = Arc::clone(&self.state.coordinator).spawn(
            config.sync.interval(),
            config.sync.jitter,
            cancel.clone(),
        );

        SchedulerHandle {
            cancel,
            registration,
            tasks: vec![sync, logger],
        }
    }
}

/// Running scheduler tasks.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    registration: Option<Registration>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop probing and wait for the tasks to finish.
    ///
    /// A pass already in progress completes first.
    pub async fn shutdown(self) {
        if let Some(registration) = &self.registration {
            registration.unregister();
        }
        self.cancel.cancel();

        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Scheduler task failed: {}", e);
            }
        }
    }
}

/// Log engine events until cancelled.
async fn log_events(mut events: EventReceiver, cancel: CancellationToken) {
    let mut consecutive_failures = 0u32;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SyncEvent::ConnectivityChanged { available }) => {
                if available {
                    info!("Campus API reachable");
                } else {
                    warn!("Campus API unreachable, serving from cache");
                }
            }
            Ok(SyncEvent::PassCompleted {
                synced,
                failed,
                visits_synced,
            }) => {
                if failed == 0 {
                    consecutive_failures = 0;
                    if synced > 0 || visits_synced > 0 {
                        info!(
                            "Sync pass delivered {} edit(s) and {} visit(s)",
                            synced, visits_synced
                        );
                    }
                } else {
                    consecutive_failures += 1;
                    if consecutive_failures <= LOUD_FAILURES {
                        warn!(
                            "Sync pass left {} edit(s) failed (pass {})",
                            failed, consecutive_failures
                        );
                    } else if consecutive_failures == LOUD_FAILURES + 1 {
                        error!(
                            "Sync passes keep failing after {} attempts, will continue retrying silently",
                            consecutive_failures
                        );
                    }
                }
            }
            Ok(SyncEvent::RecordSyncFailed { id, error }) => {
                debug!("Push of event detail {} failed: {}", id, error);
            }
            Ok(SyncEvent::CacheRefreshed { partition, count }) => {
                debug!("Refreshed {:?} with {} record(s)", partition, count);
            }
            Ok(other) => debug!("{:?}", other),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event log fell behind, skipped {} event(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use campus_core::types::{Event, EventDetailPayload};
    use campus_core::{ConnectivityMonitor, MockRemote};
    use campus_store::CacheStore;

    fn state(base_url: &str) -> (Arc<AppState>, Arc<MockRemote>) {
        let mut config = Config::default();
        config.remote.base_url = base_url.to_string();

        let remote = Arc::new(MockRemote::new());
        let state = AppState::with_remote(
            config,
            CacheStore::open_in_memory().unwrap(),
            remote.clone(),
            ConnectivityMonitor::new(false),
        )
        .unwrap();
        (state, remote)
    }

    async fn next_pass(events: &mut EventReceiver) -> (usize, usize) {
        loop {
            if let SyncEvent::PassCompleted {
                synced,
                visits_synced,
                ..
            } = events.recv().await.unwrap()
            {
                return (synced, visits_synced);
            }
        }
    }

    #[tokio::test]
    async fn test_probe_success_triggers_pass() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api", listener.local_addr().unwrap());
        let (state, remote) = state(&base_url);

        state
            .details
            .save(EventDetailPayload {
                event: Event {
                    id: 8,
                    title: "Concierto".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();

        let mut events = state.backend.events().subscribe();
        let handle = Scheduler::new(Arc::clone(&state)).start(CancellationToken::new());

        assert_eq!(next_pass(&mut events).await, (1, 0));
        assert!(state.monitor.is_available());
        assert_eq!(remote.pushed_details().await.len(), 1);

        handle.shutdown().await;
        assert_eq!(state.monitor.active_registrations(), 0);
    }

    #[tokio::test]
    async fn test_unprobeable_url_assumes_online() {
        let (state, _remote) = state("ftp://campus.example.edu");
        let handle = Scheduler::new(Arc::clone(&state)).start(CancellationToken::new());

        assert!(state.monitor.is_available());
        assert_eq!(state.monitor.active_registrations(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_tasks() {
        let (state, _remote) = state("http://127.0.0.1:9/api");
        let cancel = CancellationToken::new();
        let handle = Scheduler::new(Arc::clone(&state)).start(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }
}
