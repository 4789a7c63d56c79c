//! Event summary reads.

use campus_store::{EventQuery, LiveQuery};
use campus_types::{EntityId, Event, EventType};

use super::{Backend, loading_then};
use crate::events::Partition;
use crate::resource::{Resource, ResourceStream};

/// Offline-first access to campus events.
#[derive(Debug, Clone)]
pub struct EventRepository {
    backend: Backend,
}

impl EventRepository {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn fetch_all(&self) -> Resource<Vec<Event>> {
        self.backend
            .read_list(
                "list events",
                Partition::Events,
                self.backend.remote().list_events(),
                |store, items| store.replace_all_events(items),
                |store| store.list_events(),
            )
            .await
    }

    pub fn get_all(&self) -> ResourceStream<Vec<Event>> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_all().await })
    }

    pub async fn fetch_by_id(&self, id: EntityId) -> Resource<Event> {
        self.backend
            .read_one(
                "event",
                id,
                Partition::Events,
                self.backend.remote().get_event(id),
                |store, item| store.upsert_event(item),
                |store| store.get_event(id),
            )
            .await
    }

    pub fn get_by_id(&self, id: EntityId) -> ResourceStream<Event> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_by_id(id).await })
    }

    pub async fn fetch_by_type(&self, event_type: EventType) -> Resource<Vec<Event>> {
        let query = EventQuery::new().event_type(event_type);
        let evict = self.backend.config().evict_on_filter;
        let cached = query.clone();

        self.backend
            .read_list(
                "events by type",
                Partition::Events,
                self.backend.remote().events_by_type(event_type),
                move |store, items| {
                    if evict {
                        store.replace_events_matching(&query, items)?;
                        Ok(items.len())
                    } else {
                        store.upsert_events(items)
                    }
                },
                move |store| store.query_events(&cached),
            )
            .await
    }

    pub fn get_by_type(&self, event_type: EventType) -> ResourceStream<Vec<Event>> {
        let repo = self.clone();
        loading_then(async move { repo.fetch_by_type(event_type).await })
    }

    /// Case-insensitive search over event titles.
    pub async fn fetch_search(&self, text: &str) -> Resource<Vec<Event>> {
        self.backend
            .read_list(
                "search events",
                Partition::Events,
                self.backend.remote().search_events(text),
                |store, items| store.upsert_events(items),
                |store| store.search_events(text),
            )
            .await
    }

    pub fn search(&self, text: &str) -> ResourceStream<Vec<Event>> {
        let repo = self.clone();
        let text = text.to_string();
        loading_then(async move { repo.fetch_search(&text).await })
    }

    pub fn observe(&self, query: EventQuery) -> LiveQuery<Vec<Event>> {
        self.backend.cache().watch_events(query)
    }

    pub fn observe_by_id(&self, id: EntityId) -> LiveQuery<Option<Event>> {
        self.backend.cache().watch_event(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRemote;
    use crate::repo::testing::backend;
    use crate::resource::Origin;

    fn event(id: EntityId, title: &str, event_type: EventType) -> Event {
        Event {
            id,
            title: title.to_string(),
            event_type: Some(event_type),
            start_time: "2024-03-01T18:00:00Z".to_string(),
            end_time: "2024-03-01T20:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_by_type_then_offline() {
        let remote = MockRemote::builder()
            .events([
                event(1, "Cine club", EventType::Movies),
                event(2, "Torneo de fútbol", EventType::Sports),
            ])
            .build();
        let (backend, _) = backend(remote, true);
        let repo = EventRepository::new(backend.clone());

        let movies = repo.fetch_by_type(EventType::Movies).await;
        assert_eq!(movies.origin(), Some(Origin::Network));
        assert_eq!(movies.data().unwrap().len(), 1);

        backend.monitor().report(false);
        let cached = repo.fetch_by_type(EventType::Movies).await;
        assert_eq!(cached, Resource::cached(vec![event(1, "Cine club", EventType::Movies)]));

        // Sports was never fetched, so the cache has nothing for it
        let sports = repo.fetch_by_type(EventType::Sports).await;
        assert_eq!(sports, Resource::cached(vec![]));
    }

    #[tokio::test]
    async fn test_id_zero_payloads_are_dropped() {
        let remote = MockRemote::builder()
            .events([
                event(0, "Draft", EventType::Event),
                event(3, "Feria", EventType::Event),
            ])
            .build();
        let (backend, _) = backend(remote, true);

        let result = EventRepository::new(backend).fetch_all().await;
        let ids: Vec<_> = result.data().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3]);
    }
}
