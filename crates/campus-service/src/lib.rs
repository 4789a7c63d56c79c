//! Background sync daemon for the campus offline cache.
//!
//! This crate wires [`campus_core`] to the real campus API and keeps the
//! local cache in step with it:
//! - Probes the API host and reports reachability to the engine
//! - Runs a sync pass whenever connectivity returns, and on a schedule
//! - Delivers queued event-detail edits and the visit log
//! - Offers one-shot `sync`, `status` and `reset` maintenance commands
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/campus/sync.toml`:
//!
//! ```toml
//! [remote]
//! base_url = "https://campus.example.edu/api"
//! request_timeout_secs = 10
//!
//! [storage]
//! path = "~/.local/share/campus/cache.db"
//!
//! [sync]
//! interval_secs = 300
//! push_timeout_secs = 15
//! jitter = true
//! fallback_policy = "cache_as_success"  # or "error_with_stale"
//! evict_on_filter = false
//!
//! [connectivity]
//! probe_interval_secs = 30
//! probe_timeout_secs = 3
//! ```

pub mod config;
pub mod probe;
pub mod scheduler;
pub mod state;

pub use config::{
    Config, ConfigError, ConnectivityConfig, RemoteConfig, StorageConfig, SyncConfig,
    ValidationError,
};
pub use probe::TcpProbe;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use state::{AppState, StateError, StatusSnapshot};
