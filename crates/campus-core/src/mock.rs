//! Mock remote data source for testing.
//!
//! [`MockRemote`] implements [`RemoteDataSource`] over in-memory collections,
//! so repositories and the sync coordinator can be exercised without a
//! server.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, one operation, or pushes of
//!   specific records
//! - **Latency simulation**: delay every call to exercise timeouts
//! - **Call counters**: assert whether the network was consulted

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use campus_types::{
    Building, EntityId, Event, EventDetailPayload, EventType, PlacePayload, UNSAVED_ID,
    VisitedItem,
};

use crate::remote::{RemoteDataSource, RemoteError, RemoteResult};

/// Remote operations, for targeted failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListBuildings,
    GetBuilding,
    BuildingsByCategory,
    SearchBuildings,
    ListPlaces,
    GetPlace,
    PlacesByBuilding,
    PlacesByCategory,
    SearchPlaces,
    ListEvents,
    GetEvent,
    EventsByType,
    SearchEvents,
    GetEventDetail,
    PushEventDetail,
    PushVisit,
}

/// An in-memory campus API.
///
/// # Example
///
/// ```
/// use campus_core::{MockRemote, RemoteDataSource};
/// use campus_types::Building;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let remote = MockRemote::builder()
///     .building(Building {
///         id: 1,
///         name: "Mario Laserna".into(),
///         code: "ML".into(),
///         description: None,
///         latitude: 4.60,
///         longitude: -74.06,
///         image_url: None,
///         category: "academic".into(),
///     })
///     .build();
///
/// assert_eq!(remote.list_buildings().await.unwrap().len(), 1);
/// # }
/// ```
pub struct MockRemote {
    buildings: RwLock<Vec<Building>>,
    places: RwLock<Vec<PlacePayload>>,
    events: RwLock<Vec<Event>>,
    details: RwLock<HashMap<EntityId, EventDetailPayload>>,
    visits: RwLock<Vec<VisitedItem>>,
    pushed: RwLock<Vec<EventDetailPayload>>,
    should_fail: AtomicBool,
    failing_ops: Mutex<HashMap<Operation, RemoteError>>,
    failing_push_ids: Mutex<HashSet<EntityId>>,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    next_id: AtomicI64,
    calls: Mutex<HashMap<Operation, u32>>,
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemote")
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl MockRemote {
    /// Create an empty mock API.
    pub fn new() -> Self {
        Self {
            buildings: RwLock::new(Vec::new()),
            places: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            details: RwLock::new(HashMap::new()),
            visits: RwLock::new(Vec::new()),
            pushed: RwLock::new(Vec::new()),
            should_fail: AtomicBool::new(false),
            failing_ops: Mutex::new(HashMap::new()),
            failing_push_ids: Mutex::new(HashSet::new()),
            latency_ms: AtomicU64::new(0),
            next_id: AtomicI64::new(1000),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Create a builder.
    pub fn builder() -> MockRemoteBuilder {
        MockRemoteBuilder::default()
    }

    async fn check(&self, op: Operation) -> RemoteResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(op)
            .or_insert(0) += 1;

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(RemoteError::Network("Mock network failure".to_string()));
        }

        let failing = self
            .failing_ops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match failing.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    // --- Test control methods ---

    /// Make every call fail with a network error.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Make one operation fail with `error`.
    pub fn fail_operation(&self, op: Operation, error: RemoteError) {
        self.failing_ops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(op, error);
    }

    /// Make pushes of the record with this id fail.
    pub fn fail_push_for(&self, id: EntityId) {
        self.failing_push_ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id);
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        self.should_fail.store(false, Ordering::Relaxed);
        self.failing_ops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.failing_push_ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Set simulated latency for every call.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of calls made to an operation.
    pub fn call_count(&self, op: Operation) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls made to any operation.
    pub fn total_calls(&self) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Replace the served buildings.
    pub async fn set_buildings(&self, buildings: Vec<Building>) {
        *self.buildings.write().await = buildings;
    }

    /// Replace the served places.
    pub async fn set_places(&self, places: Vec<PlacePayload>) {
        *self.places.write().await = places;
    }

    /// Replace the served events.
    pub async fn set_events(&self, events: Vec<Event>) {
        *self.events.write().await = events;
    }

    /// Serve an event detail.
    pub async fn add_event_detail(&self, detail: EventDetailPayload) {
        self.details.write().await.insert(detail.event.id, detail);
    }

    /// Every successfully pushed event detail, in push order.
    pub async fn pushed_details(&self) -> Vec<EventDetailPayload> {
        self.pushed.read().await.clone()
    }

    /// Every successfully pushed visit, in push order.
    pub async fn pushed_visits(&self) -> Vec<VisitedItem> {
        self.visits.read().await.clone()
    }
}

#[async_trait]
impl RemoteDataSource for MockRemote {
    // --- Buildings ---

    async fn list_buildings(&self) -> RemoteResult<Vec<Building>> {
        self.check(Operation::ListBuildings).await?;
        Ok(self.buildings.read().await.clone())
    }

    async fn get_building(&self, id: EntityId) -> RemoteResult<Option<Building>> {
        self.check(Operation::GetBuilding).await?;
        Ok(self.buildings.read().await.iter().find(|b| b.id == id).cloned())
    }

    async fn buildings_by_category(&self, category: &str) -> RemoteResult<Vec<Building>> {
        self.check(Operation::BuildingsByCategory).await?;
        Ok(self
            .buildings
            .read()
            .await
            .iter()
            .filter(|b| b.category == category)
            .cloned()
            .collect())
    }

    async fn search_buildings(&self, text: &str) -> RemoteResult<Vec<Building>> {
        self.check(Operation::SearchBuildings).await?;
        Ok(self
            .buildings
            .read()
            .await
            .iter()
            .filter(|b| contains_ci(&b.name, text) || contains_ci(&b.code, text))
            .cloned()
            .collect())
    }

    // --- Places ---

    async fn list_places(&self) -> RemoteResult<Vec<PlacePayload>> {
        self.check(Operation::ListPlaces).await?;
        Ok(self.places.read().await.clone())
    }

    async fn get_place(&self, id: EntityId) -> RemoteResult<Option<PlacePayload>> {
        self.check(Operation::GetPlace).await?;
        Ok(self.places.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn places_by_building(&self, building_id: EntityId) -> RemoteResult<Vec<PlacePayload>> {
        self.check(Operation::PlacesByBuilding).await?;
        Ok(self
            .places
            .read()
            .await
            .iter()
            .filter(|p| p.resolved_building_id() == Some(building_id))
            .cloned()
            .collect())
    }

    async fn places_by_category(&self, category: &str) -> RemoteResult<Vec<PlacePayload>> {
        self.check(Operation::PlacesByCategory).await?;
        Ok(self
            .places
            .read()
            .await
            .iter()
            .filter(|p| p.category.as_deref() == Some(category))
            .cloned()
            .collect())
    }

    async fn search_places(&self, text: &str) -> RemoteResult<Vec<PlacePayload>> {
        self.check(Operation::SearchPlaces).await?;
        Ok(self
            .places
            .read()
            .await
            .iter()
            .filter(|p| contains_ci(&p.name, text))
            .cloned()
            .collect())
    }

    // --- Events ---

    async fn list_events(&self) -> RemoteResult<Vec<Event>> {
        self.check(Operation::ListEvents).await?;
        Ok(self.events.read().await.clone())
    }

    async fn get_event(&self, id: EntityId) -> RemoteResult<Option<Event>> {
        self.check(Operation::GetEvent).await?;
        Ok(self.events.read().await.iter().find(|e| e.id == id).cloned())
    }

    async fn events_by_type(&self, event_type: EventType) -> RemoteResult<Vec<Event>> {
        self.check(Operation::EventsByType).await?;
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == Some(event_type))
            .cloned()
            .collect())
    }

    async fn search_events(&self, text: &str) -> RemoteResult<Vec<Event>> {
        self.check(Operation::SearchEvents).await?;
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| contains_ci(&e.title, text))
            .cloned()
            .collect())
    }

    // --- Event details ---

    async fn get_event_detail(&self, id: EntityId) -> RemoteResult<Option<EventDetailPayload>> {
        self.check(Operation::GetEventDetail).await?;
        Ok(self.details.read().await.get(&id).cloned())
    }

    async fn push_event_detail(&self, detail: &EventDetailPayload) -> RemoteResult<EntityId> {
        self.check(Operation::PushEventDetail).await?;

        let failing = self
            .failing_push_ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&detail.event.id);
        if failing {
            return Err(RemoteError::Http {
                status: 500,
                message: format!("Mock push failure for {}", detail.event.id),
            });
        }

        let id = if detail.event.id == UNSAVED_ID {
            self.next_id.fetch_add(1, Ordering::Relaxed)
        } else {
            detail.event.id
        };

        let mut stored = detail.clone();
        stored.event.id = id;
        self.details.write().await.insert(id, stored.clone());
        self.pushed.write().await.push(stored);
        Ok(id)
    }

    // --- Visits ---

    async fn push_visit(&self, visit: &VisitedItem) -> RemoteResult<()> {
        self.check(Operation::PushVisit).await?;
        self.visits.write().await.push(visit.clone());
        Ok(())
    }
}

/// Builder for creating mock remotes with pre-loaded data.
#[derive(Debug, Default)]
pub struct MockRemoteBuilder {
    buildings: Vec<Building>,
    places: Vec<PlacePayload>,
    events: Vec<Event>,
    details: Vec<EventDetailPayload>,
    latency: Option<Duration>,
}

impl MockRemoteBuilder {
    /// Add a building.
    #[must_use]
    pub fn building(mut self, building: Building) -> Self {
        self.buildings.push(building);
        self
    }

    /// Add buildings.
    #[must_use]
    pub fn buildings(mut self, buildings: impl IntoIterator<Item = Building>) -> Self {
        self.buildings.extend(buildings);
        self
    }

    /// Add a place.
    #[must_use]
    pub fn place(mut self, place: PlacePayload) -> Self {
        self.places.push(place);
        self
    }

    /// Add places.
    #[must_use]
    pub fn places(mut self, places: impl IntoIterator<Item = PlacePayload>) -> Self {
        self.places.extend(places);
        self
    }

    /// Add an event.
    #[must_use]
    pub fn event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Add events.
    #[must_use]
    pub fn events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self
    }

    /// Add an event detail.
    #[must_use]
    pub fn event_detail(mut self, detail: EventDetailPayload) -> Self {
        self.details.push(detail);
        self
    }

    /// Delay every call.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Build the mock remote.
    pub fn build(self) -> MockRemote {
        let remote = MockRemote {
            buildings: RwLock::new(self.buildings),
            places: RwLock::new(self.places),
            events: RwLock::new(self.events),
            details: RwLock::new(self.details.into_iter().map(|d| (d.event.id, d)).collect()),
            ..MockRemote::new()
        };
        if let Some(latency) = self.latency {
            remote.set_latency(latency);
        }
        remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn building(id: EntityId, name: &str, category: &str) -> Building {
        Building {
            id,
            name: name.to_string(),
            code: name[..2].to_uppercase(),
            description: None,
            latitude: 0.0,
            longitude: 0.0,
            image_url: None,
            category: category.to_string(),
        }
    }

    #[tokio::test]
    async fn test_filters_and_search() {
        let remote = MockRemote::builder()
            .buildings([
                building(1, "Mario Laserna", "academic"),
                building(2, "Santo Domingo", "academic"),
                building(3, "Gimnasio", "sports"),
            ])
            .build();

        assert_eq!(remote.list_buildings().await.unwrap().len(), 3);
        assert_eq!(remote.buildings_by_category("sports").await.unwrap().len(), 1);
        assert_eq!(remote.search_buildings("santo").await.unwrap()[0].id, 2);
        assert!(remote.get_building(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_fail() {
        let remote = MockRemote::new();
        remote.set_should_fail(true);
        assert!(matches!(
            remote.list_events().await,
            Err(RemoteError::Network(_))
        ));

        remote.clear_failures();
        assert!(remote.list_events().await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_single_operation() {
        let remote = MockRemote::new();
        remote.fail_operation(
            Operation::ListPlaces,
            RemoteError::Http {
                status: 503,
                message: "down".to_string(),
            },
        );

        assert!(remote.list_places().await.is_err());
        assert!(remote.list_buildings().await.is_ok());
        assert_eq!(remote.call_count(Operation::ListPlaces), 1);
        assert_eq!(remote.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_push_assigns_ids_to_new_records() {
        let remote = MockRemote::new();
        let mut payload = EventDetailPayload::default();
        payload.event.title = "Hackathon".to_string();

        let created = remote.push_event_detail(&payload).await.unwrap();
        assert!(created >= 1000);

        payload.event.id = 42;
        assert_eq!(remote.push_event_detail(&payload).await.unwrap(), 42);

        assert_eq!(remote.pushed_details().await.len(), 2);
        assert!(remote.get_event_detail(created).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fail_push_for_id() {
        let remote = MockRemote::new();
        remote.fail_push_for(2);

        let mut ok = EventDetailPayload::default();
        ok.event.id = 1;
        let mut bad = EventDetailPayload::default();
        bad.event.id = 2;

        assert!(remote.push_event_detail(&ok).await.is_ok());
        assert!(matches!(
            remote.push_event_detail(&bad).await,
            Err(RemoteError::Http { status: 500, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let remote = MockRemote::builder()
            .latency(Duration::from_millis(200))
            .build();

        let start = tokio::time::Instant::now();
        remote.list_buildings().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
