//! Place reads and the place → building join.

use serde::Serialize;

use campus_store::{LiveQuery, PlaceQuery};
use campus_types::{Building, EntityId, Place, PlacePayload};

use super::{Backend, BuildingRepository, loading_then};
use crate::events::Partition;
use crate::remote::RemoteResult;
use crate::resource::{FailureKind, Resource, ResourceStream};

fn into_places(result: RemoteResult<Vec<PlacePayload>>) -> RemoteResult<Vec<Place>> {
    result.map(|payloads| payloads.into_iter().map(Place::from).collect())
}

/// A place together with its building, resolved at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceWithBuilding {
    pub place: Place,
    /// `None` when the place has no building or it could not be resolved.
    pub building: Option<Building>,
}

/// Offline-first access to campus places.
///
/// Places are cached with only their scalar `building_id`; a building
/// embedded in an API response is dropped on the way in.
#[derive(Debug, Clone)]
pub struct PlaceRepository {
    backend: Backend,
    buildings: BuildingRepository,
}

impl PlaceRepository {
    pub fn new(backend: Backend) -> Self {
        Self {
            buildings: BuildingRepository::new(backend.clone()),
            backend,
        }
    }

    /// Every place. A network answer replaces the cached table.
    pub async fn fetch_all(&self) -> Resource<Vec<Place>> {
        let remote = self.backend.remote();
        self.backend
            .read_list(
                "list places",
                Partition::Places,
                async { into_places(remote.list_places().await) },
                |store, items| store.replace_all_places(items),
                |store| store.list_places(),
            )
            .await
    }

    pub fn get_all(&self) -> ResourceStream<Vec<Place>> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_all().await })
    }

    pub async fn fetch_by_id(&self, id: EntityId) -> Resource<Place> {
        let remote = self.backend.remote();
        self.backend
            .read_one(
                "place",
                id,
                Partition::Places,
                async { remote.get_place(id).await.map(|p| p.map(Place::from)) },
                |store, item| store.upsert_place(item),
                |store| store.get_place(id),
            )
            .await
    }

    pub fn get_by_id(&self, id: EntityId) -> ResourceStream<Place> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_by_id(id).await })
    }

    pub async fn fetch_by_building(&self, building_id: EntityId) -> Resource<Vec<Place>> {
        let remote = self.backend.remote();
        self.read_filtered(
            "places by building",
            PlaceQuery::new().building(building_id),
            async { into_places(remote.places_by_building(building_id).await) },
        )
        .await
    }

    pub fn get_by_building(&self, building_id: EntityId) -> ResourceStream<Vec<Place>> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_by_building(building_id).await })
    }

    pub async fn fetch_by_category(&self, category: &str) -> Resource<Vec<Place>> {
        let remote = self.backend.remote();
        self.read_filtered(
            "places by category",
            PlaceQuery::new().category(category),
            async { into_places(remote.places_by_category(category).await) },
        )
        .await
    }

    pub fn get_by_category(&self, category: &str) -> ResourceStream<Vec<Place>> {
        let repo = self.clone();
        let category = category.to_string();
        loading_then(async move { repo.fetch_by_category(&category).await })
    }

    /// Case-insensitive search over the place name.
    pub async fn fetch_search(&self, text: &str) -> Resource<Vec<Place>> {
        let remote = self.backend.remote();
        self.backend
            .read_list(
                "search places",
                Partition::Places,
                async { into_places(remote.search_places(text).await) },
                |store, items| store.upsert_places(items),
                |store| store.search_places(text),
            )
            .await
    }

    pub fn search(&self, text: &str) -> ResourceStream<Vec<Place>> {
        let repo = self.clone();
        let text = text.to_string();
        loading_then(async move { repo.fetch_search(&text).await })
    }

    async fn read_filtered(
        &self,
        operation: &str,
        query: PlaceQuery,
        call: impl Future<Output = RemoteResult<Vec<Place>>>,
    ) -> Resource<Vec<Place>> {
        let evict = self.backend.config().evict_on_filter;
        let cached = query.clone();

        self.backend
            .read_list(
                operation,
                Partition::Places,
                call,
                move |store, items| {
                    if evict {
                        store.replace_places_matching(&query, items)?;
                        Ok(items.len())
                    } else {
                        store.upsert_places(items)
                    }
                },
                move |store| store.query_places(&cached),
            )
            .await
    }

    /// The building a place belongs to, read through the building
    /// repository.
    pub async fn building_of(&self, place: &Place) -> Resource<Building> {
        match place.building_id {
            Some(building_id) => self.buildings.fetch_by_id(building_id).await,
            None => Resource::error(
                FailureKind::NotFound,
                format!("place {} has no building", place.id),
            ),
        }
    }

    /// Attach the place's building. The building is best effort: stale data
    /// is used when that is all there is.
    pub async fn with_building(&self, place: Place) -> PlaceWithBuilding {
        let building = self.building_of(&place).await.into_display_data();
        PlaceWithBuilding { place, building }
    }

    /// Live view of the cached places matching `query`.
    pub fn observe(&self, query: PlaceQuery) -> LiveQuery<Vec<Place>> {
        self.backend.cache().watch_places(query)
    }

    pub fn observe_by_id(&self, id: EntityId) -> LiveQuery<Option<Place>> {
        self.backend.cache().watch_place(id)
    }
}
