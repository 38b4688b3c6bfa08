//! Connection opening and schema creation.

use std::path::Path;

use rusqlite::Connection;

use crate::DbError;

/// Opens (or creates) the store at the given path and ensures the schema
/// exists. WAL journaling and foreign-key enforcement are enabled on
/// every connection.
///
/// # Errors
///
/// Returns [`DbError`] if the connection, pragmas, or schema creation
/// fail.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Opens the store at its default location (`data/distressed.db`).
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(&crate::paths::db_path())
}

/// Opens an in-memory store with the full schema. Used by tests.
///
/// # Errors
///
/// Returns [`DbError`] if schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS properties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address_raw TEXT,
            address_norm TEXT UNIQUE NOT NULL,
            zip_code TEXT,
            latitude REAL,
            longitude REAL,
            property_type TEXT DEFAULT 'unknown',
            total_score REAL DEFAULT 0,
            tier TEXT DEFAULT 'C',
            first_seen TEXT NOT NULL,
            last_updated TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(id),
            source TEXT NOT NULL,
            source_record_id TEXT NOT NULL,
            signal_type TEXT NOT NULL,
            signal_weight REAL DEFAULT 0,
            detail TEXT,
            event_date TEXT,
            fetched_at TEXT NOT NULL,
            UNIQUE(source, source_record_id)
        );

        CREATE INDEX IF NOT EXISTS idx_signals_property ON signals(property_id);
        CREATE INDEX IF NOT EXISTS idx_signals_source ON signals(source);

        CREATE TABLE IF NOT EXISTS normalization_issues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address_raw TEXT,
            address_norm TEXT,
            source TEXT,
            latitude REAL,
            longitude REAL,
            nearest_property_id INTEGER,
            distance_meters REAL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            sources TEXT,
            properties_count INTEGER,
            signals_count INTEGER,
            status TEXT DEFAULT 'running'
        );",
    )?;

    Ok(())
}
