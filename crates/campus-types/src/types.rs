//! Core entity types for cached campus data.
//!
//! Every entity has a network shape (what the remote API sends) and a cache
//! shape (what the local store persists). For buildings and events the two
//! are identical. Places and event details differ:
//!
//! - [`PlacePayload`] may embed the owning [`Building`]; [`Place`] only keeps
//!   the scalar `building_id`.
//! - [`EventDetailPayload`] carries no sync bookkeeping; [`EventDetail`] adds
//!   [`SyncStatus`] and the local `last_updated` timestamp.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Server-assigned identifier. `0` marks a record the server has never
/// confirmed.
pub type EntityId = i64;

/// The id carried by records that have not been confirmed by the server.
pub const UNSAVED_ID: EntityId = 0;

/// A campus building.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Building {
    /// Server-assigned id (0 = unsaved).
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Short building code (e.g. "ML").
    pub code: String,
    /// Free-form description.
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Image URL.
    #[cfg_attr(feature = "serde", serde(default, rename = "imageUrl"))]
    pub image_url: Option<String>,
    /// Building category (e.g. "academic").
    pub category: String,
}

impl Building {
    /// Whether the server has confirmed this record.
    pub fn is_confirmed(&self) -> bool {
        self.id != UNSAVED_ID
    }
}

/// A place inside (or near) a building, in its cache shape.
///
/// Only the scalar `building_id` is kept. Use [`PlacePayload`] for the
/// network shape that may embed the building.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Place {
    pub id: EntityId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub code: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub floor: Option<String>,
    /// Free-form coordinates string; not parsed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub coordinates: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "imageUrl"))]
    pub image_url: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "buildingId"))]
    pub building_id: Option<EntityId>,
}

impl Place {
    /// Whether the server has confirmed this record.
    pub fn is_confirmed(&self) -> bool {
        self.id != UNSAVED_ID
    }

    /// Convert to the network shape. The building is never embedded.
    pub fn to_payload(&self) -> PlacePayload {
        PlacePayload {
            id: self.id,
            name: self.name.clone(),
            code: self.code.clone(),
            category: self.category.clone(),
            floor: self.floor.clone(),
            coordinates: self.coordinates.clone(),
            image_url: self.image_url.clone(),
            building_id: self.building_id,
            building: None,
        }
    }
}

/// A place as sent by the remote API.
///
/// The optional embedded `building` is a convenience for the API; it is
/// resolved into `building_id` and dropped when converting to [`Place`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlacePayload {
    pub id: EntityId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub code: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub category: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub floor: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub coordinates: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "imageUrl"))]
    pub image_url: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "buildingId"))]
    pub building_id: Option<EntityId>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub building: Option<Building>,
}

impl PlacePayload {
    /// The building id, taken from the scalar field first and from the
    /// embedded building otherwise.
    pub fn resolved_building_id(&self) -> Option<EntityId> {
        self.building_id
            .or_else(|| self.building.as_ref().map(|b| b.id))
            .filter(|id| *id != UNSAVED_ID)
    }
}

impl From<PlacePayload> for Place {
    fn from(payload: PlacePayload) -> Self {
        let building_id = payload.resolved_building_id();
        Self {
            id: payload.id,
            name: payload.name,
            code: payload.code,
            category: payload.category,
            floor: payload.floor,
            coordinates: payload.coordinates,
            image_url: payload.image_url,
            building_id,
        }
    }
}

/// Kind of campus event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventType {
    /// General campus event.
    Event,
    /// Movie screening.
    Movies,
    /// Sports fixture.
    Sports,
}

impl EventType {
    /// All supported event types.
    pub const ALL: [EventType; 3] = [EventType::Event, EventType::Movies, EventType::Sports];

    /// The wire / storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Event => "event",
            EventType::Movies => "movies",
            EventType::Sports => "sports",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(EventType::Event),
            "movies" => Ok(EventType::Movies),
            "sports" => Ok(EventType::Sports),
            _ => Err(ParseError::UnknownEventType(s.to_string())),
        }
    }
}

/// A campus event summary.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    pub id: EntityId,
    pub title: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "imageUrl"))]
    pub image_url: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "type"))]
    pub event_type: Option<EventType>,
    /// ISO-8601 start time, kept as text.
    #[cfg_attr(feature = "serde", serde(rename = "startTime"))]
    pub start_time: String,
    /// ISO-8601 end time, kept as text.
    #[cfg_attr(feature = "serde", serde(rename = "endTime"))]
    pub end_time: String,
    #[cfg_attr(feature = "serde", serde(default, rename = "locationId"))]
    pub location_id: Option<EntityId>,
    #[cfg_attr(feature = "serde", serde(default, rename = "locationName"))]
    pub location_name: Option<String>,
}

impl Event {
    /// Whether the server has confirmed this record.
    pub fn is_confirmed(&self) -> bool {
        self.id != UNSAVED_ID
    }
}

/// Sync state of a locally editable record.
///
/// Valid transitions:
///
/// ```text
/// pending_sync ──push ok──▶ synced
///      │  ▲
/// push │  │ retry pass
///  fail▼  │
///   sync_error
/// ```
///
/// A `synced` record only becomes `pending_sync` again through a new local
/// edit, which is not a status transition but a fresh write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncStatus {
    /// Written locally, not yet confirmed by the server.
    #[default]
    PendingSync,
    /// Confirmed by the server.
    Synced,
    /// The last push attempt failed; retried on the next sync pass.
    SyncError,
}

impl SyncStatus {
    /// The storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::PendingSync => "pending_sync",
            SyncStatus::Synced => "synced",
            SyncStatus::SyncError => "sync_error",
        }
    }

    /// Whether the sync state machine allows moving from `self` to `next`.
    ///
    /// Staying in the same state is not a transition and returns `false`.
    #[must_use]
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::PendingSync, SyncStatus::Synced)
                | (SyncStatus::PendingSync, SyncStatus::SyncError)
                | (SyncStatus::SyncError, SyncStatus::PendingSync)
        )
    }

    /// Whether the record still has to reach the server.
    pub fn needs_push(&self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_sync" => Ok(SyncStatus::PendingSync),
            "synced" => Ok(SyncStatus::Synced),
            "sync_error" => Ok(SyncStatus::SyncError),
            _ => Err(ParseError::UnknownSyncStatus(s.to_string())),
        }
    }
}

/// Event detail as sent to and received from the remote API.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventDetailPayload {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub event: Event,
    #[cfg_attr(feature = "serde", serde(default, rename = "organizerName"))]
    pub organizer_name: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub capacity: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default, rename = "registrationUrl"))]
    pub registration_url: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, rename = "additionalInfo"))]
    pub additional_info: Option<String>,
}

/// Editable event detail in its cache shape.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventDetail {
    /// The event fields. `event.id` is the record key.
    pub event: Event,
    pub organizer_name: Option<String>,
    pub capacity: Option<u32>,
    pub registration_url: Option<String>,
    pub additional_info: Option<String>,
    /// Sync state of the last local write.
    pub last_sync_status: SyncStatus,
    /// When the record was last written locally.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_updated: OffsetDateTime,
}

impl EventDetail {
    /// The record id.
    pub fn id(&self) -> EntityId {
        self.event.id
    }

    /// Build the cache shape of a detail received from the server.
    pub fn from_remote(payload: EventDetailPayload) -> Self {
        Self {
            event: payload.event,
            organizer_name: payload.organizer_name,
            capacity: payload.capacity,
            registration_url: payload.registration_url,
            additional_info: payload.additional_info,
            last_sync_status: SyncStatus::Synced,
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    /// Start a new local edit from a payload.
    pub fn local_edit(payload: EventDetailPayload) -> Self {
        Self {
            last_sync_status: SyncStatus::PendingSync,
            ..Self::from_remote(payload)
        }
    }

    /// Convert to the network shape, dropping sync bookkeeping.
    pub fn to_payload(&self) -> EventDetailPayload {
        EventDetailPayload {
            event: self.event.clone(),
            organizer_name: self.organizer_name.clone(),
            capacity: self.capacity,
            registration_url: self.registration_url.clone(),
            additional_info: self.additional_info.clone(),
        }
    }
}

/// An entry in the local visit audit log.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VisitedItem {
    /// Autogenerated local id.
    pub id: i64,
    /// The visited event.
    pub event_id: EntityId,
    /// Event title at the time of the visit.
    pub title: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub visited_at: OffsetDateTime,
    /// Whether the visit has been reported to the server.
    pub was_synced: bool,
}
