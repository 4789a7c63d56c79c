//! Main store implementation.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::OffsetDateTime;
use tracing::{debug, info};

use campus_types::{
    Building, EntityId, Event, EventDetail, EventType, Place, SyncStatus, UNSAVED_ID, VisitedItem,
};

use crate::error::{Error, Result};
use crate::models::{CacheCounts, Confirmation, LocalWrite, PendingDetail};
use crate::queries::{BuildingQuery, EventQuery, PlaceQuery};
use crate::schema;

const BUILDING_COLUMNS: &str =
    "id, name, code, description, latitude, longitude, image_url, category";
const PLACE_COLUMNS: &str =
    "id, name, code, category, floor, coordinates, image_url, building_id";
const EVENT_COLUMNS: &str = "id, title, description, image_url, event_type, start_time, \
     end_time, location_id, location_name";
const DETAIL_COLUMNS: &str = "id, title, description, image_url, event_type, start_time, \
     end_time, location_id, location_name, organizer_name, capacity, registration_url, \
     additional_info, sync_status, last_updated, local_revision";
const VISIT_COLUMNS: &str = "id, event_id, title, visited_at, was_synced";

/// SQLite-based cache for campus entities.
///
/// All methods are synchronous and commit before returning. Multi-row
/// writes run inside a single transaction.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening cache database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Delete every cached record, including unsynced local edits and the
    /// visit log.
    pub fn delete_all(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM places;
             DELETE FROM buildings;
             DELETE FROM events;
             DELETE FROM event_details;
             DELETE FROM visits;",
        )?;
        tx.commit()?;
        info!("Cache reset");
        Ok(())
    }

    /// Row counts per table.
    pub fn counts(&self) -> Result<CacheCounts> {
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(CacheCounts {
            buildings: count("SELECT COUNT(*) FROM buildings")?,
            places: count("SELECT COUNT(*) FROM places")?,
            events: count("SELECT COUNT(*) FROM events")?,
            event_details: count("SELECT COUNT(*) FROM event_details")?,
            unsynced_details: count(
                "SELECT COUNT(*) FROM event_details WHERE sync_status != 'synced'",
            )?,
            visits: count("SELECT COUNT(*) FROM visits")?,
            unsynced_visits: count("SELECT COUNT(*) FROM visits WHERE was_synced = 0")?,
        })
    }
}

// === Row decoding ===

/// Timestamps are stored as Unix nanoseconds (years 1678 to 2262).
fn to_nanos(ts: OffsetDateTime) -> rusqlite::Result<i64> {
    i64::try_from(ts.unix_timestamp_nanos())
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_nanos(idx: usize, nanos: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn parse_text<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn event_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<EventType>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_text(idx, &s))
        .transpose()
}

fn building_from_row(row: &Row<'_>) -> rusqlite::Result<Building> {
    Ok(Building {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        image_url: row.get(6)?,
        category: row.get(7)?,
    })
}

fn place_from_row(row: &Row<'_>) -> rusqlite::Result<Place> {
    Ok(Place {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        category: row.get(3)?,
        floor: row.get(4)?,
        coordinates: row.get(5)?,
        image_url: row.get(6)?,
        building_id: row.get(7)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image_url: row.get(3)?,
        event_type: event_type_at(row, 4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        location_id: row.get(7)?,
        location_name: row.get(8)?,
    })
}

fn pending_detail_from_row(row: &Row<'_>) -> rusqlite::Result<PendingDetail> {
    let status: String = row.get(13)?;
    Ok(PendingDetail {
        detail: EventDetail {
            event: event_from_row(row)?,
            organizer_name: row.get(9)?,
            capacity: row.get(10)?,
            registration_url: row.get(11)?,
            additional_info: row.get(12)?,
            last_sync_status: parse_text(13, &status)?,
            last_updated: from_nanos(14, row.get(14)?)?,
        },
        revision: row.get(15)?,
    })
}

fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<VisitedItem> {
    Ok(VisitedItem {
        id: row.get(0)?,
        event_id: row.get(1)?,
        title: row.get(2)?,
        visited_at: from_nanos(3, row.get(3)?)?,
        was_synced: row.get(4)?,
    })
}

/// Advance a store-wide counter and return its new value (first value 1).
///
/// Counters survive row deletion and `delete_all`.
fn next_sequence(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "INSERT INTO sequences (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1
         RETURNING value",
        [name],
        |row| row.get(0),
    )
}

/// Provisional (negative) key for an unsaved record. Never collides with
/// server ids, which are positive, nor with any key handed out before.
fn cache_key(conn: &Connection, table: &str, id: EntityId) -> rusqlite::Result<EntityId> {
    if id != UNSAVED_ID {
        return Ok(id);
    }
    let key = -next_sequence(conn, "provisional_key")?;
    debug!("Assigned provisional key {} in {}", key, table);
    Ok(key)
}

/// Ids of `matching` rows that are confirmed and absent from `keep`.
fn stale_ids(matching: impl Iterator<Item = EntityId>, keep: &[EntityId]) -> Vec<EntityId> {
    let keep: HashSet<EntityId> = keep.iter().copied().collect();
    matching
        .filter(|id| *id > 0 && !keep.contains(id))
        .collect()
}

fn delete_ids(conn: &Connection, table: &str, ids: &[EntityId]) -> rusqlite::Result<usize> {
    let sql = format!("DELETE FROM {table} WHERE id = ?");
    let mut stmt = conn.prepare(&sql)?;
    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute([id])?;
    }
    Ok(deleted)
}

// === Building operations ===

fn write_building(conn: &Connection, building: &Building) -> rusqlite::Result<EntityId> {
    let id = cache_key(conn, "buildings", building.id)?;
    conn.execute(
        "INSERT INTO buildings (id, name, code, description, latitude, longitude, image_url, category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            code = excluded.code,
            description = excluded.description,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            image_url = excluded.image_url,
            category = excluded.category",
        params![
            id,
            building.name,
            building.code,
            building.description,
            building.latitude,
            building.longitude,
            building.image_url,
            building.category,
        ],
    )?;
    Ok(id)
}

fn select_buildings(conn: &Connection, query: &BuildingQuery) -> rusqlite::Result<Vec<Building>> {
    let (where_clause, params) = query.build_where();
    let sql = format!("SELECT {BUILDING_COLUMNS} FROM buildings {where_clause} ORDER BY name, id");
    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), building_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().filter(|b| query.matches_text(b)).collect())
}

impl Store {
    /// Insert or replace a building. Returns the cache key it was stored
    /// under (provisional for id 0).
    pub fn upsert_building(&self, building: &Building) -> Result<EntityId> {
        Ok(write_building(&self.conn, building)?)
    }

    /// Insert or replace several buildings in one transaction.
    pub fn upsert_buildings(&self, buildings: &[Building]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for building in buildings {
            write_building(&tx, building)?;
        }
        tx.commit()?;
        debug!("Upserted {} building(s)", buildings.len());
        Ok(buildings.len())
    }

    /// Get a building by id.
    pub fn get_building(&self, id: EntityId) -> Result<Option<Building>> {
        let sql = format!("SELECT {BUILDING_COLUMNS} FROM buildings WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [id], building_from_row)
            .optional()?)
    }

    /// All cached buildings, ordered by name.
    pub fn list_buildings(&self) -> Result<Vec<Building>> {
        self.query_buildings(&BuildingQuery::new())
    }

    /// Buildings matching a query shape.
    pub fn query_buildings(&self, query: &BuildingQuery) -> Result<Vec<Building>> {
        Ok(select_buildings(&self.conn, query)?)
    }

    /// Buildings whose name or code contains `text` (case-insensitive).
    pub fn search_buildings(&self, text: &str) -> Result<Vec<Building>> {
        self.query_buildings(&BuildingQuery::new().search(text))
    }

    /// Delete a building and, through the cascade trigger, its places.
    pub fn delete_building(&self, id: EntityId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM buildings WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Delete every cached building (and their places).
    pub fn delete_all_buildings(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM buildings", [])?)
    }

    /// Make `buildings` the authoritative content of the rows selected by
    /// `query`: matching rows absent from `buildings` are deleted, the rest
    /// are upserted. Returns the number of evicted rows.
    pub fn replace_buildings_matching(
        &self,
        query: &BuildingQuery,
        buildings: &[Building],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let keep: Vec<EntityId> = buildings.iter().map(|b| b.id).collect();
        let stale = stale_ids(select_buildings(&tx, query)?.into_iter().map(|b| b.id), &keep);
        let evicted = delete_ids(&tx, "buildings", &stale)?;
        for building in buildings {
            write_building(&tx, building)?;
        }
        tx.commit()?;

        if evicted > 0 {
            debug!("Evicted {} stale building(s)", evicted);
        }
        Ok(evicted)
    }

    /// Replace the whole buildings table with `buildings`.
    pub fn replace_all_buildings(&self, buildings: &[Building]) -> Result<usize> {
        self.replace_buildings_matching(&BuildingQuery::new(), buildings)
    }
}

// === Place operations ===

fn write_place(conn: &Connection, place: &Place) -> rusqlite::Result<EntityId> {
    let id = cache_key(conn, "places", place.id)?;
    conn.execute(
        "INSERT INTO places (id, name, code, category, floor, coordinates, image_url, building_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            code = excluded.code,
            category = excluded.category,
            floor = excluded.floor,
            coordinates = excluded.coordinates,
            image_url = excluded.image_url,
            building_id = excluded.building_id",
        params![
            id,
            place.name,
            place.code,
            place.category,
            place.floor,
            place.coordinates,
            place.image_url,
            place.building_id,
        ],
    )?;
    Ok(id)
}

fn select_places(conn: &Connection, query: &PlaceQuery) -> rusqlite::Result<Vec<Place>> {
    let (where_clause, params) = query.build_where();
    let sql = format!("SELECT {PLACE_COLUMNS} FROM places {where_clause} ORDER BY name, id");
    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), place_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().filter(|p| query.matches_text(p)).collect())
}

impl Store {
    /// Insert or replace a place.
    pub fn upsert_place(&self, place: &Place) -> Result<EntityId> {
        Ok(write_place(&self.conn, place)?)
    }

    /// Insert or replace several places in one transaction.
    pub fn upsert_places(&self, places: &[Place]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for place in places {
            write_place(&tx, place)?;
        }
        tx.commit()?;
        debug!("Upserted {} place(s)", places.len());
        Ok(places.len())
    }

    /// Get a place by id.
    pub fn get_place(&self, id: EntityId) -> Result<Option<Place>> {
        let sql = format!("SELECT {PLACE_COLUMNS} FROM places WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], place_from_row).optional()?)
    }

    /// All cached places, ordered by name.
    pub fn list_places(&self) -> Result<Vec<Place>> {
        self.query_places(&PlaceQuery::new())
    }

    /// Places matching a query shape.
    pub fn query_places(&self, query: &PlaceQuery) -> Result<Vec<Place>> {
        Ok(select_places(&self.conn, query)?)
    }

    /// Places whose name contains `text` (case-insensitive).
    pub fn search_places(&self, text: &str) -> Result<Vec<Place>> {
        self.query_places(&PlaceQuery::new().search(text))
    }

    /// Delete a place.
    pub fn delete_place(&self, id: EntityId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM places WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Delete every cached place.
    pub fn delete_all_places(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM places", [])?)
    }

    /// Make `places` the authoritative content of the rows selected by
    /// `query`. Returns the number of evicted rows.
    pub fn replace_places_matching(&self, query: &PlaceQuery, places: &[Place]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let keep: Vec<EntityId> = places.iter().map(|p| p.id).collect();
        let stale = stale_ids(select_places(&tx, query)?.into_iter().map(|p| p.id), &keep);
        let evicted = delete_ids(&tx, "places", &stale)?;
        for place in places {
            write_place(&tx, place)?;
        }
        tx.commit()?;

        if evicted > 0 {
            debug!("Evicted {} stale place(s)", evicted);
        }
        Ok(evicted)
    }

    /// Replace the whole places table with `places`.
    pub fn replace_all_places(&self, places: &[Place]) -> Result<usize> {
        self.replace_places_matching(&PlaceQuery::new(), places)
    }
}

// === Event operations ===

fn write_event(conn: &Connection, event: &Event) -> rusqlite::Result<EntityId> {
    let id = cache_key(conn, "events", event.id)?;
    conn.execute(
        "INSERT INTO events (id, title, description, image_url, event_type, start_time,
            end_time, location_id, location_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            image_url = excluded.image_url,
            event_type = excluded.event_type,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            location_id = excluded.location_id,
            location_name = excluded.location_name",
        params![
            id,
            event.title,
            event.description,
            event.image_url,
            event.event_type.map(|t| t.as_str()),
            event.start_time,
            event.end_time,
            event.location_id,
            event.location_name,
        ],
    )?;
    Ok(id)
}

fn select_events(conn: &Connection, query: &EventQuery) -> rusqlite::Result<Vec<Event>> {
    let (where_clause, params) = query.build_where();
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events {where_clause} ORDER BY start_time, title, id"
    );
    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().filter(|e| query.matches_text(e)).collect())
}

impl Store {
    /// Insert or replace an event.
    pub fn upsert_event(&self, event: &Event) -> Result<EntityId> {
        Ok(write_event(&self.conn, event)?)
    }

    /// Insert or replace several events in one transaction.
    pub fn upsert_events(&self, events: &[Event]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for event in events {
            write_event(&tx, event)?;
        }
        tx.commit()?;
        debug!("Upserted {} event(s)", events.len());
        Ok(events.len())
    }

    /// Get an event by id.
    pub fn get_event(&self, id: EntityId) -> Result<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], event_from_row).optional()?)
    }

    /// All cached events, ordered by start time.
    pub fn list_events(&self) -> Result<Vec<Event>> {
        self.query_events(&EventQuery::new())
    }

    /// Events matching a query shape.
    pub fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        Ok(select_events(&self.conn, query)?)
    }

    /// Events whose title contains `text` (case-insensitive).
    pub fn search_events(&self, text: &str) -> Result<Vec<Event>> {
        self.query_events(&EventQuery::new().search(text))
    }

    /// Delete an event.
    pub fn delete_event(&self, id: EntityId) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM events WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Delete every cached event summary.
    pub fn delete_all_events(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM events", [])?)
    }

    /// Make `events` the authoritative content of the rows selected by
    /// `query`. Returns the number of evicted rows.
    pub fn replace_events_matching(&self, query: &EventQuery, events: &[Event]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let keep: Vec<EntityId> = events.iter().map(|e| e.id).collect();
        let stale = stale_ids(select_events(&tx, query)?.into_iter().map(|e| e.id), &keep);
        let evicted = delete_ids(&tx, "events", &stale)?;
        for event in events {
            write_event(&tx, event)?;
        }
        tx.commit()?;

        if evicted > 0 {
            debug!("Evicted {} stale event(s)", evicted);
        }
        Ok(evicted)
    }

    /// Replace the whole events table with `events`.
    pub fn replace_all_events(&self, events: &[Event]) -> Result<usize> {
        self.replace_events_matching(&EventQuery::new(), events)
    }
}

// === Event detail operations ===

fn select_details(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<PendingDetail>> {
    let sql = format!(
        "SELECT {DETAIL_COLUMNS} FROM event_details {filter} ORDER BY last_updated, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(params, pending_detail_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
}

impl Store {
    /// Write an event detail exactly as given (status and timestamp
    /// included) under a fresh local revision. Id 0 gets a provisional key.
    ///
    /// Revisions come from a store-wide counter, so a row that is deleted
    /// and written again never repeats a revision an older push holds.
    pub fn upsert_event_detail(&self, detail: &EventDetail) -> Result<LocalWrite> {
        let last_updated = to_nanos(detail.last_updated)?;
        let tx = self.conn.unchecked_transaction()?;
        let id = cache_key(&tx, "event_details", detail.id())?;
        let revision = next_sequence(&tx, "local_revision")?;
        let event = &detail.event;

        tx.execute(
            "INSERT INTO event_details (id, title, description, image_url, event_type,
                start_time, end_time, location_id, location_name, organizer_name, capacity,
                registration_url, additional_info, sync_status, last_updated, local_revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                image_url = excluded.image_url,
                event_type = excluded.event_type,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                location_id = excluded.location_id,
                location_name = excluded.location_name,
                organizer_name = excluded.organizer_name,
                capacity = excluded.capacity,
                registration_url = excluded.registration_url,
                additional_info = excluded.additional_info,
                sync_status = excluded.sync_status,
                last_updated = excluded.last_updated,
                local_revision = excluded.local_revision",
            params![
                id,
                event.title,
                event.description,
                event.image_url,
                event.event_type.map(|t| t.as_str()),
                event.start_time,
                event.end_time,
                event.location_id,
                event.location_name,
                detail.organizer_name,
                detail.capacity,
                detail.registration_url,
                detail.additional_info,
                detail.last_sync_status.as_str(),
                last_updated,
                revision,
            ],
        )?;
        tx.commit()?;

        Ok(LocalWrite { id, revision })
    }

    /// Store a detail fetched from the server, unless a local edit of the
    /// same record is still unsynced. Returns whether the row was written.
    pub fn store_remote_event_detail(&self, detail: &EventDetail) -> Result<bool> {
        if detail.id() <= 0 {
            return Ok(false);
        }

        let protected: Option<String> = self
            .conn
            .query_row(
                "SELECT sync_status FROM event_details WHERE id = ? AND sync_status != 'synced'",
                [detail.id()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(status) = protected {
            debug!(
                "Keeping local event detail {} ({}) over remote copy",
                detail.id(),
                status
            );
            return Ok(false);
        }

        let remote = EventDetail {
            last_sync_status: SyncStatus::Synced,
            ..detail.clone()
        };
        self.upsert_event_detail(&remote)?;
        Ok(true)
    }

    /// Get an event detail by cache key.
    pub fn get_event_detail(&self, id: EntityId) -> Result<Option<EventDetail>> {
        Ok(self.get_event_detail_revision(id)?.map(|p| p.detail))
    }

    /// Get an event detail together with its local revision.
    pub fn get_event_detail_revision(&self, id: EntityId) -> Result<Option<PendingDetail>> {
        let sql = format!("SELECT {DETAIL_COLUMNS} FROM event_details WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [id], pending_detail_from_row)
            .optional()?)
    }

    /// All cached event details, oldest local write first.
    pub fn list_event_details(&self) -> Result<Vec<EventDetail>> {
        Ok(select_details(&self.conn, "", &[])?
            .into_iter()
            .map(|p| p.detail)
            .collect())
    }

    /// Event details in the given status, with their revisions, oldest
    /// local write first.
    pub fn event_details_with_status(&self, status: SyncStatus) -> Result<Vec<PendingDetail>> {
        Ok(select_details(
            &self.conn,
            "WHERE sync_status = ?",
            &[&status.as_str()],
        )?)
    }

    /// Compare-and-set a status transition.
    ///
    /// Applies only when the row is in `from`, the move is legal for the
    /// sync state machine and, if given, the local revision still matches.
    pub fn transition_event_detail(
        &self,
        id: EntityId,
        revision: Option<i64>,
        from: SyncStatus,
        to: SyncStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            debug!("Rejected sync transition {} -> {} for {}", from, to, id);
            return Ok(false);
        }

        let updated = match revision {
            Some(revision) => self.conn.execute(
                "UPDATE event_details SET sync_status = ?1
                 WHERE id = ?2 AND sync_status = ?3 AND local_revision = ?4",
                params![to.as_str(), id, from.as_str(), revision],
            )?,
            None => self.conn.execute(
                "UPDATE event_details SET sync_status = ?1 WHERE id = ?2 AND sync_status = ?3",
                params![to.as_str(), id, from.as_str()],
            )?,
        };

        Ok(updated > 0)
    }

    /// Move every `sync_error` record back to `pending_sync`. Returns the
    /// re-queued ids.
    pub fn requeue_failed_event_details(&self) -> Result<Vec<EntityId>> {
        let tx = self.conn.unchecked_transaction()?;
        let ids: Vec<EntityId> = tx
            .prepare("SELECT id FROM event_details WHERE sync_status = 'sync_error' ORDER BY id")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tx.execute(
            "UPDATE event_details SET sync_status = 'pending_sync' WHERE sync_status = 'sync_error'",
            [],
        )?;
        tx.commit()?;
        Ok(ids)
    }

    /// Record a successful push of `id` at `revision`.
    ///
    /// If the row is still `pending_sync` at that revision it becomes
    /// `synced` under `server_id`. If it was edited meanwhile, a provisional
    /// key is still moved to `server_id` (so the next push updates instead of
    /// creating a duplicate) but the status is left alone. A cached copy
    /// already stored under `server_id` is replaced.
    pub fn confirm_event_detail(
        &self,
        id: EntityId,
        revision: i64,
        server_id: EntityId,
    ) -> Result<Confirmation> {
        let tx = self.conn.unchecked_transaction()?;

        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT sync_status, local_revision FROM event_details WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((status, rev)) = current else {
            return Ok(Confirmation::Stale);
        };

        let outcome = if status == SyncStatus::PendingSync.as_str() && rev == revision {
            Confirmation::Synced
        } else if id < 0 && server_id > 0 {
            Confirmation::Rekeyed
        } else {
            return Ok(Confirmation::Stale);
        };

        if server_id != id {
            tx.execute("DELETE FROM event_details WHERE id = ?", [server_id])?;
            tx.execute(
                "UPDATE event_details SET id = ?1 WHERE id = ?2",
                params![server_id, id],
            )?;
            debug!("Re-keyed event detail {} -> {}", id, server_id);
        }
        if outcome == Confirmation::Synced {
            tx.execute(
                "UPDATE event_details SET sync_status = 'synced' WHERE id = ?",
                [server_id],
            )?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Delete an event detail.
    pub fn delete_event_detail(&self, id: EntityId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM event_details WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Delete every cached event detail, including unsynced edits.
    pub fn delete_all_event_details(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM event_details", [])?)
    }
}

// === Visit log operations ===

impl Store {
    /// Append a visit to the audit log.
    pub fn append_visit(
        &self,
        event_id: EntityId,
        title: &str,
        visited_at: OffsetDateTime,
    ) -> Result<VisitedItem> {
        self.conn.execute(
            "INSERT INTO visits (event_id, title, visited_at, was_synced) VALUES (?1, ?2, ?3, 0)",
            params![event_id, title, to_nanos(visited_at)?],
        )?;

        Ok(VisitedItem {
            id: self.conn.last_insert_rowid(),
            event_id,
            title: title.to_string(),
            visited_at,
            was_synced: false,
        })
    }

    /// Visits, newest first.
    pub fn list_visits(&self, limit: Option<u32>) -> Result<Vec<VisitedItem>> {
        let mut sql = format!("SELECT {VISIT_COLUMNS} FROM visits ORDER BY visited_at DESC, id DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let visits = stmt
            .query_map([], visit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(visits)
    }

    /// Visits not yet reported to the server, oldest first.
    pub fn unsynced_visits(&self) -> Result<Vec<VisitedItem>> {
        let sql = format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE was_synced = 0 ORDER BY visited_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let visits = stmt
            .query_map([], visit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(visits)
    }

    /// Flip the synced flag of a visit. The only in-place update the log
    /// allows.
    pub fn mark_visit_synced(&self, id: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE visits SET was_synced = 1 WHERE id = ? AND was_synced = 0",
            [id],
        )?;
        Ok(updated > 0)
    }
}
