//! Local cache for campus data.
//!
//! This crate provides SQLite-based storage for buildings, places, events
//! and editable event details, so the app keeps working without a network
//! connection.
//!
//! # Features
//!
//! - Upsert, point lookup, filtered listing and deletion per entity
//! - Case-insensitive text search over cached rows
//! - Building deletion cascades to the building's places
//! - Sync bookkeeping for local event-detail edits (status, revision,
//!   provisional keys for records the server has not confirmed)
//! - Append-only visit log
//! - Live queries that re-emit after every committed change
//!
//! # Example
//!
//! ```no_run
//! use campus_store::{PlaceQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let labs = store.query_places(&PlaceQuery::new().building(3).search("lab"))?;
//! println!("{} cached labs", labs.len());
//! # Ok::<(), campus_store::Error>(())
//! ```

mod cache;
mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use cache::{CacheStore, LiveQuery, Table};
pub use error::{Error, Result};
pub use models::{CacheCounts, Confirmation, LocalWrite, PendingDetail};
pub use queries::{BuildingQuery, EventQuery, PlaceQuery};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/campus/cache.db`
/// - macOS: `~/Library/Application Support/campus/cache.db`
/// - Windows: `C:\Users\<user>\AppData\Local\campus\cache.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("campus")
        .join("cache.db")
}
