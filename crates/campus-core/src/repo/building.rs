//! Building reads.

use campus_store::{BuildingQuery, LiveQuery};
use campus_types::{Building, EntityId};

use super::{Backend, loading_then};
use crate::events::Partition;
use crate::resource::{Resource, ResourceStream};

/// Offline-first access to campus buildings.
#[derive(Debug, Clone)]
pub struct BuildingRepository {
    backend: Backend,
}

impl BuildingRepository {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Every building. A network answer replaces the cached table.
    pub async fn fetch_all(&self) -> Resource<Vec<Building>> {
        self.backend
            .read_list(
                "list buildings",
                Partition::Buildings,
                self.backend.remote().list_buildings(),
                |store, items| store.replace_all_buildings(items),
                |store| store.list_buildings(),
            )
            .await
    }

    pub fn get_all(&self) -> ResourceStream<Vec<Building>> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_all().await })
    }

    pub async fn fetch_by_id(&self, id: EntityId) -> Resource<Building> {
        self.backend
            .read_one(
                "building",
                id,
                Partition::Buildings,
                self.backend.remote().get_building(id),
                |store, item| store.upsert_building(item),
                |store| store.get_building(id),
            )
            .await
    }

    pub fn get_by_id(&self, id: EntityId) -> ResourceStream<Building> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_by_id(id).await })
    }

    pub async fn fetch_by_category(&self, category: &str) -> Resource<Vec<Building>> {
        let query = BuildingQuery::new().category(category);
        let evict = self.backend.config().evict_on_filter;
        let cached = query.clone();

        self.backend
            .read_list(
                "buildings by category",
                Partition::Buildings,
                self.backend.remote().buildings_by_category(category),
                move |store, items| {
                    if evict {
                        store.replace_buildings_matching(&query, items)?;
                        Ok(items.len())
                    } else {
                        store.upsert_buildings(items)
                    }
                },
                move |store| store.query_buildings(&cached),
            )
            .await
    }

    pub fn get_by_category(&self, category: &str) -> ResourceStream<Vec<Building>> {
        let repo = self.clone();
        let category = category.to_string();
        loading_then(async move { repo.fetch_by_category(&category).await })
    }

    /// Case-insensitive search over name and code. Network
    /// results are added to the cache, never evicting.
    pub async fn fetch_search(&self, text: &str) -> Resource<Vec<Building>> {
        self.backend
            .read_list(
                "search buildings",
                Partition::Buildings,
                self.backend.remote().search_buildings(text),
                |store, items| store.upsert_buildings(items),
                |store| store.search_buildings(text),
            )
            .await
    }

    pub fn search(&self, text: &str) -> ResourceStream<Vec<Building>> {
        let repo = self.clone();
        let text = text.to_string();
        loading_then(async move { repo.fetch_search(&text).await })
    }

    /// Live view of the cached buildings matching `query`.
    pub fn observe(&self, query: BuildingQuery) -> LiveQuery<Vec<Building>> {
        self.backend.cache().watch_buildings(query)
    }

    pub fn observe_by_id(&self, id: EntityId) -> LiveQuery<Option<Building>> {
        self.backend.cache().watch_building(id)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::mock::{MockRemote, Operation};
    use crate::remote::RemoteError;
    use crate::repo::testing::{backend, backend_with, building};
    use crate::repo::{FallbackPolicy, RepositoryConfig};
    use crate::resource::{FailureKind, Origin};

    #[tokio::test]
    async fn test_online_read_replaces_cache() {
        let remote = MockRemote::builder()
            .buildings([building(1, "Mario Laserna"), building(2, "Santo Domingo")])
            .build();
        let (backend, _) = backend(remote, true);
        backend
            .cache()
            .write(&[campus_store::Table::Buildings], |s| {
                s.upsert_building(&building(9, "Old"))
            })
            .unwrap();

        let repo = BuildingRepository::new(backend.clone());
        let result = repo.fetch_all().await;

        assert_eq!(result.origin(), Some(Origin::Network));
        assert_eq!(result.data().unwrap().len(), 2);

        let cached = backend.cache().read(|s| s.list_buildings()).unwrap();
        let ids: Vec<_> = cached.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_offline_read_uses_cache() {
        let (backend, remote) = backend(MockRemote::new(), false);
        backend
            .cache()
            .write(&[campus_store::Table::Buildings], |s| {
                s.upsert_building(&building(1, "Mario Laserna"))
            })
            .unwrap();

        let result = BuildingRepository::new(backend).fetch_all().await;
        assert_eq!(result, Resource::cached(vec![building(1, "Mario Laserna")]));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_with_error_policy_keeps_stale_data() {
        let remote = MockRemote::new();
        remote.fail_operation(
            Operation::ListBuildings,
            RemoteError::Http {
                status: 503,
                message: "maintenance".to_string(),
            },
        );
        let config = RepositoryConfig::builder()
            .fallback_policy(FallbackPolicy::ErrorWithStale)
            .build()
            .unwrap();
        let (backend, _) = backend_with(remote, true, config);
        backend
            .cache()
            .write(&[campus_store::Table::Buildings], |s| {
                s.upsert_building(&building(1, "Mario Laserna"))
            })
            .unwrap();

        let result = BuildingRepository::new(backend).fetch_all().await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Remote));
        assert_eq!(result.display_data().unwrap().len(), 1);
        assert!(!result.is_blocking_error());
    }

    #[tokio::test]
    async fn test_point_read_not_found_is_definitive() {
        let (backend, _) = backend(MockRemote::new(), true);
        backend
            .cache()
            .write(&[campus_store::Table::Buildings], |s| {
                s.upsert_building(&building(4, "Cached"))
            })
            .unwrap();

        let result = BuildingRepository::new(backend).fetch_by_id(4).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
        assert!(result.is_blocking_error());
    }

    #[tokio::test]
    async fn test_point_read_offline_uncached() {
        let (backend, _) = backend(MockRemote::new(), false);
        let result = BuildingRepository::new(backend).fetch_by_id(4).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_filtered_read_keeps_other_rows_by_default() {
        let mut lab = building(2, "Colivri");
        lab.category = "research".to_string();
        let remote = MockRemote::builder().building(lab.clone()).build();
        let (backend, _) = backend(remote, true);

        let mut old = building(3, "Retired lab");
        old.category = "research".to_string();
        backend
            .cache()
            .write(&[campus_store::Table::Buildings], |s| s.upsert_building(&old))
            .unwrap();

        let repo = BuildingRepository::new(backend.clone());
        assert_eq!(
            repo.fetch_by_category("research").await,
            Resource::network(vec![lab])
        );
        // Leave-stale: row 3 survives a filtered refresh
        assert!(backend.cache().read(|s| s.get_building(3)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_filtered_read_evicts_when_enabled() {
        let mut lab = building(2, "Colivri");
        lab.category = "research".to_string();
        let remote = MockRemote::builder().building(lab).build();
        let config = RepositoryConfig::builder()
            .evict_on_filter(true)
            .build()
            .unwrap();
        let (backend, _) = backend_with(remote, true, config);

        let mut old = building(3, "Retired lab");
        old.category = "research".to_string();
        backend
            .cache()
            .write(&[campus_store::Table::Buildings], |s| s.upsert_building(&old))
            .unwrap();

        BuildingRepository::new(backend.clone())
            .fetch_by_category("research")
            .await;
        assert!(backend.cache().read(|s| s.get_building(3)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_stream_shape() {
        let remote = MockRemote::builder().building(building(1, "ML")).build();
        let (backend, _) = backend(remote, true);

        let states: Vec<_> = BuildingRepository::new(backend).get_all().collect().await;
        assert_eq!(states.len(), 2);
        assert!(states[0].is_loading());
        assert!(states[1].is_terminal());
        assert!(states[1].is_success());
    }
}
