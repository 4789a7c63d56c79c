//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database - create all tables
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Initial schema.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS buildings (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            image_url TEXT,
            category TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_buildings_category ON buildings(category);

        -- building_id is a plain column: places may be cached before their
        -- building. Cascade is handled by the trigger below.
        CREATE TABLE IF NOT EXISTS places (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            category TEXT,
            floor TEXT,
            coordinates TEXT,
            image_url TEXT,
            building_id INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_places_building ON places(building_id);

        CREATE TRIGGER IF NOT EXISTS trg_buildings_cascade_places
        AFTER DELETE ON buildings
        BEGIN
            DELETE FROM places WHERE building_id = OLD.id;
        END;

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            image_url TEXT,
            event_type TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            location_id INTEGER,
            location_name TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);

        CREATE TABLE IF NOT EXISTS event_details (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            image_url TEXT,
            event_type TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            location_id INTEGER,
            location_name TEXT,
            organizer_name TEXT,
            capacity INTEGER,
            registration_url TEXT,
            additional_info TEXT,
            sync_status TEXT NOT NULL,
            -- Unix nanoseconds
            last_updated INTEGER NOT NULL,
            local_revision INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_event_details_status ON event_details(sync_status);

        CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            visited_at INTEGER NOT NULL,
            was_synced INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_visits_synced ON visits(was_synced);

        -- Store-wide counters for local revisions and provisional keys.
        -- Never cleared, so a value is never handed out twice.
        CREATE TABLE IF NOT EXISTS sequences (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    // No migrations yet; later versions branch on old_version here.
    let _ = old_version;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
