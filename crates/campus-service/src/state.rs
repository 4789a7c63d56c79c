//! Application state: the wired-up sync engine.
//!
//! [`AppState::build`] opens the cache, creates the HTTP adapter and the
//! connectivity monitor, and hands them to every repository through one
//! shared [`Backend`]. Nothing in the engine reaches for globals, so tests
//! build the same graph over an in-memory cache and a mock API with
//! [`AppState::with_remote`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use campus_core::{
    Backend, BuildingRepository, ConnectivityMonitor, EventDetailRepository, EventRepository,
    HttpRemote, PlaceRepository, RemoteDataSource, SyncCoordinator, SyncReport, VisitLog,
};
use campus_store::{CacheCounts, CacheStore};

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// Configuration the state was built from.
    pub config: Config,
    /// Reachability shared by the engine and the probe.
    pub monitor: ConnectivityMonitor,
    pub backend: Backend,
    pub buildings: BuildingRepository,
    pub places: PlaceRepository,
    pub events: EventRepository,
    pub details: EventDetailRepository,
    pub visits: VisitLog,
    pub coordinator: Arc<SyncCoordinator>,
    started_at: OffsetDateTime,
}

impl AppState {
    /// Open the cache at `config.storage.path` and talk to `config.remote`.
    ///
    /// Starts offline; the probe started by the scheduler, or a sync
    /// command, reports the real state.
    pub fn build(config: Config) -> Result<Arc<Self>, StateError> {
        config.validate().map_err(StateError::Config)?;

        let cache = CacheStore::open(&config.storage.path).map_err(|source| StateError::Cache {
            path: config.storage.path.clone(),
            source,
        })?;

        let remote = HttpRemote::new(
            &config.remote.base_url,
            Duration::from_secs(config.remote.request_timeout_secs),
        )?;
        info!("Using campus API at {}", remote.base_url());

        Self::with_remote(config, cache, Arc::new(remote), ConnectivityMonitor::new(false))
    }

    /// Wire the engine over an already opened cache and remote.
    pub fn with_remote(
        config: Config,
        cache: Arc<CacheStore>,
        remote: Arc<dyn RemoteDataSource>,
        monitor: ConnectivityMonitor,
    ) -> Result<Arc<Self>, StateError> {
        let backend = Backend::new(cache, remote, monitor.clone(), config.repository_config())?;

        Ok(Arc::new(Self {
            monitor,
            buildings: BuildingRepository::new(backend.clone()),
            places: PlaceRepository::new(backend.clone()),
            events: EventRepository::new(backend.clone()),
            details: EventDetailRepository::new(backend.clone()),
            visits: VisitLog::new(backend.clone()),
            coordinator: Arc::new(SyncCoordinator::new(backend.clone())),
            backend,
            config,
            started_at: OffsetDateTime::now_utc(),
        }))
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.backend.cache()
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Snapshot of the cache and the last sync pass.
    pub fn status(&self) -> Result<StatusSnapshot, StateError> {
        let counts = self.cache().read(|store| store.counts())?;
        Ok(StatusSnapshot {
            online: self.monitor.is_available(),
            api: self.config.remote.base_url.clone(),
            database: self.config.storage.path.clone(),
            started_at: self.started_at,
            counts,
            last_report: self.coordinator.last_report(),
        })
    }

    /// Delete every cached record.
    ///
    /// Refuses while edits or visits are still waiting for the server,
    /// unless `force` is set.
    pub fn reset(&self, force: bool) -> Result<CacheCounts, StateError> {
        let counts = self.cache().read(|store| store.counts())?;
        let pending = counts.unsynced_details + counts.unsynced_visits;

        if pending > 0 {
            if !force {
                return Err(StateError::UnsyncedData {
                    details: counts.unsynced_details,
                    visits: counts.unsynced_visits,
                });
            }
            warn!(
                "Discarding {} unsynced edit(s) and {} unsynced visit(s)",
                counts.unsynced_details, counts.unsynced_visits
            );
        }

        self.cache().reset()?;
        info!("Cache cleared");
        Ok(counts)
    }
}

/// Point-in-time status, printed by `campus-service status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub online: bool,
    pub api: String,
    pub database: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub counts: CacheCounts,
    pub last_report: Option<SyncReport>,
}

/// Errors building or operating on the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(crate::config::ConfigError),
    #[error("Failed to open cache at {path}: {source}")]
    Cache {
        path: PathBuf,
        source: campus_store::Error,
    },
    #[error(transparent)]
    Engine(#[from] campus_core::Error),
    #[error("Cache error: {0}")]
    Store(#[from] campus_store::Error),
    #[error(
        "{details} edit(s) and {visits} visit(s) have not reached the server; use --force to discard them"
    )]
    UnsyncedData { details: u64, visits: u64 },
}
