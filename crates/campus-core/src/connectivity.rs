//! Network reachability tracking.
//!
//! [`ConnectivityMonitor`] holds the current reachability state. Platform
//! code (or a [`NetworkProbe`] polled in the background) reports changes;
//! repositories check [`ConnectivityMonitor::is_available`] before calling
//! the remote API, and the sync coordinator observes transitions.
//!
//! # Example
//!
//! ```
//! use campus_core::ConnectivityMonitor;
//! use futures::StreamExt;
//!
//! # futures::executor::block_on(async {
//! let monitor = ConnectivityMonitor::new(false);
//! let mut states = monitor.observe();
//!
//! assert_eq!(states.next().await, Some(false));
//! monitor.report(true);
//! assert_eq!(states.next().await, Some(true));
//! # });
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Source of reachability checks.
///
/// A probe that cannot determine reachability reports `false`.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Shared reachability state. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    registrations: Arc<AtomicUsize>,
}

impl ConnectivityMonitor {
    /// Create a monitor with an initial state.
    pub fn new(initial: bool) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            state: Arc::new(tx),
            registrations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Point-in-time check.
    pub fn is_available(&self) -> bool {
        *self.state.borrow()
    }

    /// Report the current reachability. Returns `true` if this was a
    /// transition.
    pub fn report(&self, available: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == available {
                false
            } else {
                *current = available;
                true
            }
        });

        if changed {
            info!(
                "Connectivity {}",
                if available { "restored" } else { "lost" }
            );
        }
        changed
    }

    /// Stream of reachability states: the current state immediately, then
    /// every transition.
    ///
    /// Rapid flapping may be coalesced, but consecutive items always differ.
    pub fn observe(&self) -> BoxStream<'static, bool> {
        let rx = self.state.subscribe();

        stream::unfold(
            (rx, None::<bool>),
            |(mut rx, last): (watch::Receiver<bool>, Option<bool>)| async move {
                loop {
                    if last.is_some() && rx.changed().await.is_err() {
                        return None;
                    }
                    let current = *rx.borrow_and_update();
                    if last != Some(current) {
                        return Some((current, (rx, Some(current))));
                    }
                }
            },
        )
        .boxed()
    }

    /// Raw receiver of the state channel.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Poll `probe` every `interval` in a background task and report its
    /// answers. Must be called from within a Tokio runtime.
    ///
    /// The probe stays registered until the returned [`Registration`] is
    /// unregistered or dropped.
    pub fn register(&self, probe: Arc<dyn NetworkProbe>, interval: Duration) -> Registration {
        let token = CancellationToken::new();
        let monitor = self.clone();
        let cancel = token.clone();

        self.registrations.fetch_add(1, Ordering::SeqCst);
        debug!("Registered connectivity probe (interval {:?})", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let available = tokio::select! {
                            _ = cancel.cancelled() => break,
                            available = probe.check() => available,
                        };
                        monitor.report(available);
                    }
                }
            }
            debug!("Connectivity probe task stopped");
        });

        Registration {
            token,
            active: AtomicBool::new(true),
            registrations: Arc::clone(&self.registrations),
        }
    }

    /// Number of probes currently registered.
    pub fn active_registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl Default for ConnectivityMonitor {
    /// Starts offline until something reports otherwise.
    fn default() -> Self {
        Self::new(false)
    }
}

/// Handle to a registered probe.
///
/// Deregisters exactly once, on [`Registration::unregister`] or drop.
#[derive(Debug)]
pub struct Registration {
    token: CancellationToken,
    active: AtomicBool,
    registrations: Arc<AtomicUsize>,
}

impl Registration {
    /// Stop the probe. Returns `false` if it was already stopped.
    pub fn unregister(&self) -> bool {
        if self.active.swap(false, Ordering::SeqCst) {
            self.token.cancel();
            self.registrations.fetch_sub(1, Ordering::SeqCst);
            debug!("Unregistered connectivity probe");
            true
        } else {
            debug!("Connectivity probe already unregistered");
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.unregister();
    }
}
