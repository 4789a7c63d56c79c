//! Offline-first sync engine for campus data.
//!
//! This crate keeps campus buildings, places, events and editable event
//! details usable without a network connection. Reads go to the remote API
//! when the device is online and fall back to the local cache
//! ([`campus_store`]) otherwise; local edits are saved first and delivered
//! later.
//!
//! # Features
//!
//! - **Connectivity tracking**: [`ConnectivityMonitor`] with pluggable probes
//! - **Network-first reads**: every read yields `Loading` and then one
//!   terminal [`Resource`], tagged with where the data came from
//! - **Local writes**: event details are persisted as `pending_sync` and
//!   pushed in the background
//! - **Sync passes**: [`SyncCoordinator`] retries failed pushes and reports
//!   the visit log when connectivity returns
//! - **Sync events**: one broadcast channel of [`SyncEvent`]s for a UI
//! - **HTTP adapter**: [`HttpRemote`] behind the `http-client` feature
//!
//! # Read outcomes
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Online, API answers | `Success { origin: Network }`, cache updated |
//! | Offline or API fails, cache has data | `Success { origin: Cache }`, or `Error { stale_data }` with [`FallbackPolicy::ErrorWithStale`] |
//! | Point read, API says no such record | `Error { kind: NotFound }` |
//! | Cache fails | `Error { kind: Storage }` |
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use campus_core::{
//!     Backend, ConnectivityMonitor, EventDetailRepository, MockRemote, RepositoryConfig,
//!     SyncCoordinator, SyncStatus,
//! };
//! use campus_core::types::{Event, EventDetailPayload};
//! use campus_store::CacheStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor = ConnectivityMonitor::new(false);
//! let backend = Backend::new(
//!     CacheStore::open_in_memory()?,
//!     Arc::new(MockRemote::new()),
//!     monitor.clone(),
//!     RepositoryConfig::default(),
//! )?;
//!
//! // Offline edit: stored locally, nothing sent yet
//! let details = EventDetailRepository::new(backend.clone());
//! let write = details.save(EventDetailPayload {
//!     event: Event { id: 7, title: "Hackathon".into(), ..Default::default() },
//!     ..Default::default()
//! })?;
//! assert_eq!(write.record.last_sync_status, SyncStatus::PendingSync);
//!
//! // Back online: one pass delivers it
//! monitor.report(true);
//! let report = SyncCoordinator::new(backend).run_once().await;
//! assert_eq!(report.synced, vec![7]);
//! # Ok(())
//! # }
//! ```

pub mod connectivity;
pub mod error;
pub mod events;
#[cfg(feature = "http-client")]
pub mod http_remote;
mod locks;
pub mod mock;
pub mod remote;
pub mod repo;
pub mod resource;
pub mod sync;

// Re-export the entity types
pub use campus_types as types;
pub use campus_types::{EntityId, SyncStatus};

// Core exports
pub use connectivity::{ConnectivityMonitor, NetworkProbe, Registration};
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, Partition, SyncEvent};
pub use mock::{MockRemote, MockRemoteBuilder, Operation};
pub use remote::{RemoteDataSource, RemoteError, RemoteResult, with_timeout};
pub use repo::{
    Backend, BuildingRepository, EventDetailRepository, EventRepository, FallbackPolicy, Keyed,
    PendingWrite, PlaceRepository, PlaceWithBuilding, PushOutcome, RepositoryConfig,
    RepositoryConfigBuilder, VisitLog,
};
pub use resource::{FailureKind, Origin, Resource, ResourceStream};
pub use sync::{SyncCoordinator, SyncReport};

#[cfg(feature = "http-client")]
pub use http_remote::HttpRemote;
