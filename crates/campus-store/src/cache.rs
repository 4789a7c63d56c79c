//! Shared, observable handle over the [`Store`].
//!
//! [`CacheStore`] serializes access to the single SQLite connection and keeps
//! a revision counter per table. Every committed write bumps the counters of
//! the tables it touched, and live queries re-run whenever a counter they
//! watch moves.
//!
//! ```
//! use campus_store::{BuildingQuery, CacheStore, Table};
//! use campus_types::Building;
//! use futures::StreamExt;
//!
//! # futures::executor::block_on(async {
//! let cache = CacheStore::open_in_memory()?;
//! let mut live = cache.watch_buildings(BuildingQuery::new());
//!
//! assert!(live.next().await.unwrap()?.is_empty());
//!
//! let building = Building {
//!     id: 1,
//!     name: "Mario Laserna".into(),
//!     code: "ML".into(),
//!     description: None,
//!     latitude: 4.60,
//!     longitude: -74.06,
//!     image_url: None,
//!     category: "academic".into(),
//! };
//! cache.write(&[Table::Buildings], |store| store.upsert_building(&building))?;
//!
//! assert_eq!(live.next().await.unwrap()?.len(), 1);
//! # Ok::<(), campus_store::Error>(())
//! # }).unwrap();
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;
use tracing::trace;

use campus_types::{Building, EntityId, Event, EventDetail, Place, VisitedItem};

use crate::error::Result;
use crate::queries::{BuildingQuery, EventQuery, PlaceQuery};
use crate::store::Store;

/// A cache table that can be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Buildings,
    Places,
    Events,
    EventDetails,
    Visits,
}

impl Table {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            Table::Buildings => 0,
            Table::Places => 1,
            Table::Events => 2,
            Table::EventDetails => 3,
            Table::Visits => 4,
        }
    }

    /// Tables whose rows a write to `self` may also change.
    fn affected(self) -> &'static [Table] {
        match self {
            // Deleting a building cascades to its places
            Table::Buildings => &[Table::Buildings, Table::Places],
            Table::Places => &[Table::Places],
            Table::Events => &[Table::Events],
            Table::EventDetails => &[Table::EventDetails],
            Table::Visits => &[Table::Visits],
        }
    }

    /// Every table.
    pub const ALL: [Table; Table::COUNT] = [
        Table::Buildings,
        Table::Places,
        Table::Events,
        Table::EventDetails,
        Table::Visits,
    ];
}

/// A stream that yields the current query result, then a fresh result after
/// every committed change to the watched table.
///
/// The stream ends once the [`CacheStore`] is dropped.
pub type LiveQuery<T> = BoxStream<'static, Result<T>>;

/// Thread-safe, observable cache.
pub struct CacheStore {
    store: Mutex<Store>,
    revisions: [watch::Sender<u64>; Table::COUNT],
}

impl CacheStore {
    /// Wrap an opened store.
    pub fn new(store: Store) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            revisions: std::array::from_fn(|_| watch::channel(0).0),
        })
    }

    /// Open or create a cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        Ok(Self::new(Store::open(path)?))
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> Result<Arc<Self>> {
        Ok(Self::new(Store::open_in_memory()?))
    }

    /// Run a read against the store.
    pub fn read<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    /// Run a write against the store and, if it succeeds, notify observers
    /// of `tables`.
    pub fn write<T>(&self, tables: &[Table], f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        let result = {
            let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            f(&store)
        }?;

        for table in tables {
            self.notify(*table);
        }
        Ok(result)
    }

    /// Bump the revision of a table (and of tables it cascades into).
    pub fn notify(&self, table: Table) {
        for affected in table.affected() {
            self.revisions[affected.index()].send_modify(|rev| *rev += 1);
        }
        trace!("Cache table {:?} changed", table);
    }

    /// Current revision of a table.
    pub fn revision(&self, table: Table) -> u64 {
        *self.revisions[table.index()].borrow()
    }

    /// Receiver that fires after each committed change to `table`.
    pub fn subscribe(&self, table: Table) -> watch::Receiver<u64> {
        self.revisions[table.index()].subscribe()
    }

    /// Delete every cached record and notify all observers.
    pub fn reset(&self) -> Result<()> {
        self.write(&Table::ALL, |store| store.delete_all())
    }

    /// Build a live query over `table`.
    pub fn watch<T, F>(self: &Arc<Self>, table: Table, query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(&Store) -> Result<T> + Send + Sync + 'static,
    {
        let rx = self.subscribe(table);
        let cache = Arc::downgrade(self);

        stream::unfold(
            (cache, rx, query, true),
            |(cache, mut rx, query, first): (Weak<Self>, watch::Receiver<u64>, F, bool)| async move {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                rx.borrow_and_update();

                let cache_ref = cache.upgrade()?;
                let item = cache_ref.read(&query);
                drop(cache_ref);

                Some((item, (cache, rx, query, false)))
            },
        )
        .boxed()
    }

    /// Live list of buildings matching `query`.
    pub fn watch_buildings(self: &Arc<Self>, query: BuildingQuery) -> LiveQuery<Vec<Building>> {
        self.watch(Table::Buildings, move |store| store.query_buildings(&query))
    }

    /// Live view of a single building.
    pub fn watch_building(self: &Arc<Self>, id: EntityId) -> LiveQuery<Option<Building>> {
        self.watch(Table::Buildings, move |store| store.get_building(id))
    }

    /// Live list of places matching `query`.
    pub fn watch_places(self: &Arc<Self>, query: PlaceQuery) -> LiveQuery<Vec<Place>> {
        self.watch(Table::Places, move |store| store.query_places(&query))
    }

    /// Live view of a single place.
    pub fn watch_place(self: &Arc<Self>, id: EntityId) -> LiveQuery<Option<Place>> {
        self.watch(Table::Places, move |store| store.get_place(id))
    }

    /// Live list of events matching `query`.
    pub fn watch_events(self: &Arc<Self>, query: EventQuery) -> LiveQuery<Vec<Event>> {
        self.watch(Table::Events, move |store| store.query_events(&query))
    }

    /// Live view of a single event.
    pub fn watch_event(self: &Arc<Self>, id: EntityId) -> LiveQuery<Option<Event>> {
        self.watch(Table::Events, move |store| store.get_event(id))
    }

    /// Live view of a single event detail.
    pub fn watch_event_detail(self: &Arc<Self>, id: EntityId) -> LiveQuery<Option<EventDetail>> {
        self.watch(Table::EventDetails, move |store| store.get_event_detail(id))
    }

    /// Live list of every cached event detail.
    pub fn watch_event_details(self: &Arc<Self>) -> LiveQuery<Vec<EventDetail>> {
        self.watch(Table::EventDetails, |store| store.list_event_details())
    }

    /// Live list of the most recent visits.
    pub fn watch_visits(self: &Arc<Self>, limit: Option<u32>) -> LiveQuery<Vec<VisitedItem>> {
        self.watch(Table::Visits, move |store| store.list_visits(limit))
    }
}
