//! Entity types for the campus offline sync engine.
//!
//! This crate provides the data model shared by the cache store
//! (campus-store) and the sync engine (campus-core).
//!
//! # Features
//!
//! - Buildings, places, events and editable event details
//! - Network shapes for the remote API (with serde)
//! - The [`SyncStatus`] state machine for locally modified records
//! - The visit audit log entry
//!
//! # Example
//!
//! ```
//! use campus_types::{PlacePayload, Place};
//!
//! let payload = PlacePayload {
//!     id: 12,
//!     name: "Laboratorio Colivri".to_string(),
//!     building_id: Some(3),
//!     ..Default::default()
//! };
//! let place = Place::from(payload);
//! assert_eq!(place.building_id, Some(3));
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    Building, EntityId, Event, EventDetail, EventDetailPayload, EventType, Place, PlacePayload,
    SyncStatus, UNSAVED_ID, VisitedItem,
};

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_event_json_uses_api_field_names() {
        let json = r#"{
            "id": 41,
            "title": "Cine club",
            "type": "movies",
            "startTime": "2024-03-01T18:00:00Z",
            "endTime": "2024-03-01T20:00:00Z",
            "locationName": "Auditorio"
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, 41);
        assert_eq!(event.event_type, Some(EventType::Movies));
        assert_eq!(event.location_name.as_deref(), Some("Auditorio"));
        assert!(event.description.is_none());
    }

    #[test]
    fn test_event_detail_payload_flattens_event() {
        let json = r#"{
            "id": 5,
            "title": "Hackathon",
            "startTime": "2024-04-01T09:00:00Z",
            "endTime": "2024-04-02T09:00:00Z",
            "organizerName": "Sistemas",
            "capacity": 120
        }"#;

        let payload: EventDetailPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.event.id, 5);
        assert_eq!(payload.organizer_name.as_deref(), Some("Sistemas"));
        assert_eq!(payload.capacity, Some(120));

        let detail = EventDetail::from_remote(payload.clone());
        assert_eq!(detail.last_sync_status, SyncStatus::Synced);
        assert_eq!(detail.to_payload(), payload);
    }

    #[test]
    fn test_place_payload_without_building_is_not_serialized_with_one() {
        let place = Place {
            id: 3,
            name: "CupiTaller".to_string(),
            code: Some("ML-501".to_string()),
            building_id: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_string(&place.to_payload()).unwrap();
        assert!(json.contains("\"buildingId\":1"));
        assert!(!json.contains("\"building\""));
    }

    #[test]
    fn test_sync_status_serializes_snake_case() {
        let json = serde_json::to_string(&SyncStatus::PendingSync).unwrap();
        assert_eq!(json, "\"pending_sync\"");
    }

    fn any_status() -> impl Strategy<Value = SyncStatus> {
        prop_oneof![
            Just(SyncStatus::PendingSync),
            Just(SyncStatus::Synced),
            Just(SyncStatus::SyncError),
        ]
    }

    proptest! {
        #[test]
        fn prop_transitions_never_leave_synced(path in proptest::collection::vec(any_status(), 0..16)) {
            // Walk from pending_sync applying only legal transitions; once
            // synced, nothing may follow.
            let mut current = SyncStatus::PendingSync;
            for next in path {
                if current.can_transition_to(next) {
                    prop_assert_ne!(current, SyncStatus::Synced);
                    current = next;
                }
            }
        }
    }
}
