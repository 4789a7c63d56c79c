//! End-to-end tests for campus-core against an in-memory API.
//!
//! Each test wires a real cache (in memory, or on disk under a temp dir) to
//! a `MockRemote` and drives connectivity by hand.

use std::sync::Arc;

use futures::StreamExt;

use campus_core::types::{Building, Event, EventDetailPayload, PlacePayload};
use campus_core::{
    Backend, BuildingRepository, ConnectivityMonitor, EventDetailRepository, FailureKind,
    FallbackPolicy, MockRemote, Origin, PlaceRepository, RepositoryConfig, Resource,
    SyncCoordinator, SyncEvent, SyncStatus, VisitLog,
};
use campus_store::{CacheStore, PlaceQuery, Store, Table};

fn building(id: i64, name: &str) -> Building {
    Building {
        id,
        name: name.to_string(),
        code: format!("B{}", id),
        description: None,
        latitude: 4.6015,
        longitude: -74.0661,
        image_url: None,
        category: "academic".to_string(),
    }
}

fn detail(id: i64, title: &str) -> EventDetailPayload {
    EventDetailPayload {
        event: Event {
            id,
            title: title.to_string(),
            start_time: "2024-05-10T14:00:00Z".to_string(),
            end_time: "2024-05-10T16:00:00Z".to_string(),
            ..Default::default()
        },
        organizer_name: Some("Decanatura".to_string()),
        ..Default::default()
    }
}

struct Harness {
    backend: Backend,
    remote: Arc<MockRemote>,
    monitor: ConnectivityMonitor,
}

impl Harness {
    fn new(remote: MockRemote, online: bool, config: RepositoryConfig) -> Self {
        Self::with_cache(CacheStore::open_in_memory().unwrap(), remote, online, config)
    }

    fn with_cache(
        cache: Arc<CacheStore>,
        remote: MockRemote,
        online: bool,
        config: RepositoryConfig,
    ) -> Self {
        let remote = Arc::new(remote);
        let monitor = ConnectivityMonitor::new(online);
        let backend = Backend::new(cache, remote.clone(), monitor.clone(), config).unwrap();
        Self {
            backend,
            remote,
            monitor,
        }
    }
}

#[tokio::test]
async fn test_offline_write_is_pending() {
    let h = Harness::new(MockRemote::new(), false, RepositoryConfig::default());
    let details = EventDetailRepository::new(h.backend.clone());

    details.save(detail(11, "Feria de emprendimiento")).unwrap();

    let read = details.fetch(11).await;
    assert_eq!(read.origin(), Some(Origin::Cache));
    assert_eq!(
        read.data().unwrap().last_sync_status,
        SyncStatus::PendingSync
    );
}

#[tokio::test]
async fn test_coordinator_push_leaves_nothing_pending() {
    let h = Harness::new(MockRemote::new(), false, RepositoryConfig::default());
    let details = EventDetailRepository::new(h.backend.clone());
    details.save(detail(11, "Feria de emprendimiento")).unwrap();

    h.monitor.report(true);
    let coordinator = SyncCoordinator::new(h.backend.clone());
    let report = coordinator.run_once().await;
    assert_eq!(report.synced, vec![11]);

    let stored = h
        .backend
        .cache()
        .read(|s| s.get_event_detail(11))
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_sync_status, SyncStatus::Synced);

    let pending = h
        .backend
        .cache()
        .read(|s| s.event_details_with_status(SyncStatus::PendingSync))
        .unwrap();
    assert!(pending.is_empty());
    assert!(details.unsynced().unwrap().is_empty());
}

#[tokio::test]
async fn test_online_read_mirrors_remote() {
    let remote = MockRemote::builder()
        .buildings([building(1, "Mario Laserna"), building(2, "Santo Domingo")])
        .build();
    let h = Harness::new(remote, true, RepositoryConfig::default());
    h.backend
        .cache()
        .write(&[Table::Buildings, Table::Events], |s| {
            s.upsert_building(&building(3, "Retired"))?;
            s.upsert_event(&Event {
                id: 40,
                title: "Cine club".to_string(),
                ..Default::default()
            })
        })
        .unwrap();

    let result = BuildingRepository::new(h.backend.clone()).fetch_all().await;
    assert_eq!(
        result,
        Resource::network(vec![building(1, "Mario Laserna"), building(2, "Santo Domingo")])
    );

    let counts = h.backend.cache().read(Store::counts).unwrap();
    assert_eq!(counts.buildings, 2);
    // Other tables untouched
    assert_eq!(counts.events, 1);
}

#[tokio::test]
async fn test_offline_read_under_both_policies() {
    for policy in [FallbackPolicy::CacheAsSuccess, FallbackPolicy::ErrorWithStale] {
        let config = RepositoryConfig::builder()
            .fallback_policy(policy)
            .build()
            .unwrap();
        let h = Harness::new(MockRemote::new(), false, config);
        h.backend
            .cache()
            .write(&[Table::Buildings], |s| s.upsert_building(&building(1, "ML")))
            .unwrap();

        let result = BuildingRepository::new(h.backend.clone()).fetch_all().await;
        assert_eq!(result.display_data(), Some(&vec![building(1, "ML")]));

        match policy {
            FallbackPolicy::CacheAsSuccess => {
                assert_eq!(result.origin(), Some(Origin::Cache));
            }
            FallbackPolicy::ErrorWithStale => {
                assert_eq!(result.failure_kind(), Some(FailureKind::NetworkUnavailable));
                assert!(!result.is_blocking_error());
            }
        }
    }
}

#[tokio::test]
async fn test_one_of_two_pushes_fails() {
    let remote = MockRemote::new();
    remote.fail_push_for(22);
    let h = Harness::new(remote, false, RepositoryConfig::default());
    let details = EventDetailRepository::new(h.backend.clone());
    details.save(detail(21, "Primera")).unwrap();
    details.save(detail(22, "Segunda")).unwrap();

    h.monitor.report(true);
    let report = SyncCoordinator::new(h.backend.clone()).run_once().await;

    assert_eq!(report.synced, vec![21]);
    assert_eq!(report.failed, vec![22]);

    let status = |id| {
        h.backend
            .cache()
            .read(|s| s.get_event_detail(id))
            .unwrap()
            .unwrap()
            .last_sync_status
    };
    assert_eq!(status(21), SyncStatus::Synced);
    assert_eq!(status(22), SyncStatus::SyncError);
}

#[tokio::test]
async fn test_search_lab_matches_only_laboratorio() {
    let remote = MockRemote::builder()
        .places([
            PlacePayload {
                id: 1,
                name: "CupiTaller".to_string(),
                code: Some("ML-501".to_string()),
                building_id: Some(1),
                ..Default::default()
            },
            PlacePayload {
                id: 2,
                name: "Laboratorio Colivri".to_string(),
                code: Some("ML-340".to_string()),
                building_id: Some(1),
                ..Default::default()
            },
        ])
        .build();
    let h = Harness::new(remote, true, RepositoryConfig::default());
    let places = PlaceRepository::new(h.backend.clone());

    // Warm the cache, then search offline
    assert!(places.fetch_all().await.is_success());
    h.monitor.report(false);

    let found = places.fetch_search("lab").await;
    let names: Vec<_> = found
        .data()
        .unwrap()
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["Laboratorio Colivri"]);
}

#[tokio::test]
async fn test_building_delete_removes_places_from_live_view() {
    let h = Harness::new(MockRemote::new(), false, RepositoryConfig::default());
    let places = PlaceRepository::new(h.backend.clone());
    h.backend
        .cache()
        .write(&[Table::Buildings, Table::Places], |s| {
            s.upsert_building(&building(1, "ML"))?;
            s.upsert_place(&PlacePayload {
                id: 7,
                name: "Sala de estudio".to_string(),
                building_id: Some(1),
                ..Default::default()
            }
            .into())
        })
        .unwrap();

    let mut live = places.observe(PlaceQuery::new().building(1));
    assert_eq!(live.next().await.unwrap().unwrap().len(), 1);

    h.backend
        .cache()
        .write(&[Table::Buildings], |s| s.delete_building(1))
        .unwrap();
    assert!(live.next().await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn test_reconnect_triggers_background_pass() {
    let h = Harness::new(MockRemote::new(), false, RepositoryConfig::default());
    EventDetailRepository::new(h.backend.clone())
        .save(detail(5, "Semana cultural"))
        .unwrap();
    VisitLog::new(h.backend.clone())
        .record(5, "Semana cultural")
        .unwrap();

    let mut events = h.backend.events().subscribe();
    let coordinator = Arc::new(SyncCoordinator::new(h.backend.clone()));
    let cancel = tokio_util::sync::CancellationToken::new();
    let task = Arc::clone(&coordinator).spawn(
        std::time::Duration::from_secs(3600),
        true,
        cancel.clone(),
    );

    h.monitor.report(true);

    let completed = loop {
        match events.recv().await.unwrap() {
            SyncEvent::PassCompleted {
                synced,
                visits_synced,
                ..
            } => break (synced, visits_synced),
            _ => continue,
        }
    };
    assert_eq!(completed, (1, 1));
    assert_eq!(h.remote.pushed_visits().await.len(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_pending_edit_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campus").join("cache.db");

    {
        let h = Harness::with_cache(
            CacheStore::open(&path).unwrap(),
            MockRemote::new(),
            false,
            RepositoryConfig::default(),
        );
        EventDetailRepository::new(h.backend.clone())
            .save(detail(0, "Borrador"))
            .unwrap();
    }

    let h = Harness::with_cache(
        CacheStore::open(&path).unwrap(),
        MockRemote::new(),
        true,
        RepositoryConfig::default(),
    );
    let report = SyncCoordinator::new(h.backend.clone()).run_once().await;
    assert_eq!(report.synced, vec![1000]);
    assert_eq!(
        h.remote.pushed_details().await[0].event.title,
        "Borrador"
    );
}
