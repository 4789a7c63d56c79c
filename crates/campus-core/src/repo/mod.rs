//! Entity repositories: the offline-first read and write paths.
//!
//! Every repository shares one [`Backend`]. A read asks the remote API when
//! the device is online, writes the answer through to the cache and falls
//! back to the cache when the network cannot answer. Local edits of event
//! details are persisted first and pushed afterwards.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use campus_core::{
//!     Backend, BuildingRepository, ConnectivityMonitor, MockRemote, RepositoryConfig,
//! };
//! use campus_store::CacheStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Backend::new(
//!     CacheStore::open_in_memory()?,
//!     Arc::new(MockRemote::new()),
//!     ConnectivityMonitor::new(false),
//!     RepositoryConfig::default(),
//! )?;
//!
//! let buildings = BuildingRepository::new(backend).fetch_all().await;
//! assert_eq!(buildings.display_data(), Some(&vec![]));
//! # Ok(())
//! # }
//! ```

mod building;
mod event;
mod event_detail;
mod place;
mod visit;

pub use building::BuildingRepository;
pub use event::EventRepository;
pub use event_detail::{EventDetailRepository, PendingWrite, PushOutcome};
pub use place::{PlaceRepository, PlaceWithBuilding};
pub use visit::VisitLog;

pub(crate) use event_detail::push_detail;

use std::future::{Future, ready};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use campus_store::{CacheStore, Store, Table};
use campus_types::{Building, EntityId, Event, EventDetail, Place, UNSAVED_ID};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, Partition, SyncEvent};
use crate::locks::RecordLocks;
use crate::remote::{RemoteDataSource, RemoteError, RemoteResult, with_timeout};
use crate::resource::{FailureKind, Resource, ResourceStream};

/// How a read that fell back to the cache is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// `Success` with `Origin::Cache`.
    #[default]
    CacheAsSuccess,
    /// `Error` carrying the cached data as `stale_data`.
    ErrorWithStale,
}

/// Options shared by all repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Upper bound on a single remote read.
    /// Default: 10 seconds.
    pub request_timeout: Duration,
    /// Upper bound on a single push of a local edit.
    /// Default: 15 seconds.
    pub push_timeout: Duration,
    /// How cache fallbacks are reported.
    pub fallback_policy: FallbackPolicy,
    /// Whether a filtered network read evicts cached rows of the same filter
    /// that the response no longer contains. Off by default: filtered reads
    /// only upsert.
    pub evict_on_filter: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            push_timeout: Duration::from_secs(15),
            fallback_policy: FallbackPolicy::default(),
            evict_on_filter: false,
        }
    }
}

impl RepositoryConfig {
    /// Create a new builder for RepositoryConfig.
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Both timeouts must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::invalid_config("request_timeout must be > 0"));
        }
        if self.push_timeout.is_zero() {
            return Err(Error::invalid_config("push_timeout must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`RepositoryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RepositoryConfigBuilder {
    config: RepositoryConfig,
}

impl RepositoryConfigBuilder {
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.config.push_timeout = timeout;
        self
    }

    #[must_use]
    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback_policy = policy;
        self
    }

    #[must_use]
    pub fn evict_on_filter(mut self, evict: bool) -> Self {
        self.config.evict_on_filter = evict;
        self
    }

    /// Build the config, validating it.
    pub fn build(self) -> Result<RepositoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Records with a server-assigned key.
pub trait Keyed {
    fn key(&self) -> EntityId;
}

impl Keyed for Building {
    fn key(&self) -> EntityId {
        self.id
    }
}

impl Keyed for Place {
    fn key(&self) -> EntityId {
        self.id
    }
}

impl Keyed for Event {
    fn key(&self) -> EntityId {
        self.id
    }
}

impl Keyed for EventDetail {
    fn key(&self) -> EntityId {
        self.id()
    }
}

fn table_of(partition: Partition) -> Table {
    match partition {
        Partition::Buildings => Table::Buildings,
        Partition::Places => Table::Places,
        Partition::Events => Table::Events,
        Partition::EventDetails => Table::EventDetails,
    }
}

/// Shared collaborators of the repositories. Cheap to clone.
#[derive(Clone)]
pub struct Backend {
    cache: Arc<CacheStore>,
    remote: Arc<dyn RemoteDataSource>,
    monitor: ConnectivityMonitor,
    config: RepositoryConfig,
    events: EventDispatcher,
    locks: Arc<RecordLocks>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("monitor", &self.monitor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Wire up a backend. Fails if `config` is invalid.
    pub fn new(
        cache: Arc<CacheStore>,
        remote: Arc<dyn RemoteDataSource>,
        monitor: ConnectivityMonitor,
        config: RepositoryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache,
            remote,
            monitor,
            config,
            events: EventDispatcher::default(),
            locks: Arc::new(RecordLocks::new()),
        })
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<dyn RemoteDataSource> {
        &self.remote
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub(crate) fn locks(&self) -> &RecordLocks {
        &self.locks
    }

    /// Run a remote read if online. `None` when offline; the call is then
    /// never polled.
    pub(crate) async fn call_remote<T>(
        &self,
        operation: &str,
        call: impl Future<Output = RemoteResult<T>>,
    ) -> Option<RemoteResult<T>> {
        if !self.monitor.is_available() {
            debug!("{}: offline, reading cache", operation);
            return None;
        }
        Some(with_timeout(operation, self.config.request_timeout, call).await)
    }

    /// Network-first list read.
    ///
    /// `persist` writes a successful response into the cache, `cached` reads
    /// the fallback.
    pub(crate) async fn read_list<T, P, C>(
        &self,
        operation: &str,
        partition: Partition,
        call: impl Future<Output = RemoteResult<Vec<T>>>,
        persist: P,
        cached: C,
    ) -> Resource<Vec<T>>
    where
        T: Keyed,
        P: FnOnce(&Store, &[T]) -> campus_store::Result<usize>,
        C: FnOnce(&Store) -> campus_store::Result<Vec<T>>,
    {
        let cause = match self.call_remote(operation, call).await {
            None => Error::NetworkUnavailable,
            Some(Ok(mut items)) => {
                items.retain(|item| {
                    let confirmed = item.key() > UNSAVED_ID;
                    if !confirmed {
                        warn!("{}: dropping record without a server id", operation);
                    }
                    confirmed
                });

                return match self
                    .cache
                    .write(&[table_of(partition)], |store| persist(store, &items))
                {
                    Ok(written) => {
                        debug!("{}: cached {} records", operation, written);
                        self.events.send(SyncEvent::CacheRefreshed {
                            partition,
                            count: items.len(),
                        });
                        Resource::network(items)
                    }
                    Err(e) => {
                        error!("{}: failed to cache network result: {}", operation, e);
                        Resource::stale(FailureKind::Storage, Error::from(e).to_string(), items)
                    }
                };
            }
            Some(Err(e)) => {
                warn!("{}: remote failed, falling back to cache: {}", operation, e);
                Error::Remote(e)
            }
        };

        self.fallback_list(operation, &cause, cached)
    }

    pub(crate) fn fallback_list<T>(
        &self,
        operation: &str,
        cause: &Error,
        cached: impl FnOnce(&Store) -> campus_store::Result<Vec<T>>,
    ) -> Resource<Vec<T>> {
        match self.cache.read(cached) {
            Ok(items) => self.degraded(cause, items),
            Err(e) => {
                error!("{}: cache read failed: {}", operation, e);
                Error::from(e).into()
            }
        }
    }

    /// Network-first point read. `Ok(None)` from the API is a definitive
    /// not-found and skips the cache.
    pub(crate) async fn read_one<T, P, C>(
        &self,
        entity: &'static str,
        id: EntityId,
        partition: Partition,
        call: impl Future<Output = RemoteResult<Option<T>>>,
        persist: P,
        cached: C,
    ) -> Resource<T>
    where
        T: Keyed,
        P: FnOnce(&Store, &T) -> campus_store::Result<EntityId>,
        C: FnOnce(&Store) -> campus_store::Result<Option<T>>,
    {
        let operation = format!("get {} {}", entity, id);
        let cause = match self.call_remote(&operation, call).await {
            None => Error::NetworkUnavailable,
            Some(Ok(None)) => return Error::not_found(entity, id).into(),
            Some(Ok(Some(item))) if item.key() > UNSAVED_ID => {
                return match self
                    .cache
                    .write(&[table_of(partition)], |store| persist(store, &item))
                {
                    Ok(_) => {
                        self.events.send(SyncEvent::CacheRefreshed {
                            partition,
                            count: 1,
                        });
                        Resource::network(item)
                    }
                    Err(e) => {
                        error!("{}: failed to cache network result: {}", operation, e);
                        Resource::stale(FailureKind::Storage, Error::from(e).to_string(), item)
                    }
                };
            }
            Some(Ok(Some(_))) => {
                warn!("{}: response carried no server id", operation);
                Error::Remote(RemoteError::Network(
                    "response record has no server id".to_string(),
                ))
            }
            Some(Err(e)) => {
                warn!("{}: remote failed, falling back to cache: {}", operation, e);
                Error::Remote(e)
            }
        };

        self.fallback_one(entity, id, &cause, cached)
    }

    pub(crate) fn fallback_one<T>(
        &self,
        entity: &'static str,
        id: EntityId,
        cause: &Error,
        cached: impl FnOnce(&Store) -> campus_store::Result<Option<T>>,
    ) -> Resource<T> {
        match self.cache.read(cached) {
            Ok(Some(item)) => self.degraded(cause, item),
            Ok(None) => Resource::error(
                FailureKind::NotFound,
                format!("{} {} is not cached ({})", entity, id, cause),
            ),
            Err(e) => {
                error!("get {} {}: cache read failed: {}", entity, id, e);
                Error::from(e).into()
            }
        }
    }

    fn degraded<T>(&self, cause: &Error, data: T) -> Resource<T> {
        match self.config.fallback_policy {
            FallbackPolicy::CacheAsSuccess => Resource::cached(data),
            FallbackPolicy::ErrorWithStale => {
                Resource::stale(cause.kind(), cause.to_string(), data)
            }
        }
    }
}

/// `Loading`, then the outcome of `read`.
pub(crate) fn loading_then<T, F>(read: F) -> ResourceStream<T>
where
    T: Send + 'static,
    F: Future<Output = Resource<T>> + Send + 'static,
{
    stream::once(ready(Resource::Loading))
        .chain(stream::once(read))
        .boxed()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::mock::MockRemote;

    /// Backend over an in-memory cache and the given mock.
    pub fn backend(remote: MockRemote, online: bool) -> (Backend, Arc<MockRemote>) {
        backend_with(remote, online, RepositoryConfig::default())
    }

    pub fn backend_with(
        remote: MockRemote,
        online: bool,
        config: RepositoryConfig,
    ) -> (Backend, Arc<MockRemote>) {
        let remote = Arc::new(remote);
        let backend = Backend::new(
            CacheStore::open_in_memory().unwrap(),
            remote.clone(),
            ConnectivityMonitor::new(online),
            config,
        )
        .unwrap();
        (backend, remote)
    }

    pub fn building(id: EntityId, name: &str) -> Building {
        Building {
            id,
            name: name.to_string(),
            code: format!("B{}", id),
            description: None,
            latitude: 4.6027,
            longitude: -74.0648,
            image_url: None,
            category: "academic".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.push_timeout, Duration::from_secs(15));
        assert_eq!(config.fallback_policy, FallbackPolicy::CacheAsSuccess);
        assert!(!config.evict_on_filter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_rejects_zero_timeout() {
        let result = RepositoryConfig::builder()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let config = RepositoryConfig::builder()
            .fallback_policy(FallbackPolicy::ErrorWithStale)
            .evict_on_filter(true)
            .build()
            .unwrap();
        assert!(config.evict_on_filter);
    }

    #[test]
    fn test_fallback_policy_serde() {
        let policy: FallbackPolicy = serde_json::from_str("\"error_with_stale\"").unwrap();
        assert_eq!(policy, FallbackPolicy::ErrorWithStale);
    }

    #[tokio::test]
    async fn test_loading_then_emits_two_states() {
        let states: Vec<Resource<u8>> = loading_then(async { Resource::cached(1) })
            .collect()
            .await;
        assert_eq!(states, vec![Resource::Loading, Resource::cached(1)]);
    }
}
