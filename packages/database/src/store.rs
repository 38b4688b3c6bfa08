//! Idempotent write surface: property/signal upserts, proximity lookup,
//! normalization-issue logging, and pipeline-run bookkeeping.
//!
//! Every function takes a plain `&Connection` so callers can pass a
//! transaction for page-batched commits.

use distress_map_database_models::NearbyProperty;
use distress_map_signal_models::{SignalType, Tier};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::DbError;

/// Proximity threshold for the nearest-neighbor lookup, in degrees
/// (roughly ten meters at this latitude).
pub const PROXIMITY_DEGREES: f64 = 0.0001;

/// Rough degrees-to-meters conversion used when recording issue rows.
/// Manhattan distance in degrees times this constant overstates east-west
/// distance away from the equator; good enough for an audit trail.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Inserts or updates a property keyed on its canonical address and
/// returns the stable row id.
///
/// On conflict, nullable columns are only overwritten by non-null
/// incoming values, `property_type` only by something more specific than
/// `unknown`, and `last_updated` is always refreshed.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
#[allow(clippy::too_many_arguments)]
pub fn upsert_property(
    conn: &Connection,
    address_raw: &str,
    address_norm: &str,
    zip_code: Option<&str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    property_type: Option<&str>,
) -> Result<i64, DbError> {
    let now = now_rfc3339();
    let id = conn.query_row(
        "INSERT INTO properties (address_raw, address_norm, zip_code, latitude, longitude,
                                 property_type, first_seen, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 'unknown'), ?7, ?7)
         ON CONFLICT(address_norm) DO UPDATE SET
             address_raw = COALESCE(excluded.address_raw, properties.address_raw),
             zip_code = COALESCE(excluded.zip_code, properties.zip_code),
             latitude = COALESCE(excluded.latitude, properties.latitude),
             longitude = COALESCE(excluded.longitude, properties.longitude),
             property_type = CASE WHEN excluded.property_type != 'unknown'
                                  THEN excluded.property_type
                                  ELSE properties.property_type END,
             last_updated = excluded.last_updated
         RETURNING id",
        params![
            address_raw,
            address_norm,
            zip_code,
            latitude,
            longitude,
            property_type,
            now
        ],
        |row| row.get(0),
    )?;

    Ok(id)
}

/// Inserts a signal if its `(source, source_record_id)` pair is new.
///
/// Returns `true` if a row was inserted, `false` if the pair already
/// existed. Only the uniqueness collision is soft-handled; every other
/// database error propagates.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails for any reason other than the
/// uniqueness conflict.
#[allow(clippy::too_many_arguments)]
pub fn upsert_signal(
    conn: &Connection,
    property_id: i64,
    source: &str,
    source_record_id: &str,
    signal_type: SignalType,
    signal_weight: f64,
    detail: Option<&serde_json::Value>,
    event_date: Option<&str>,
) -> Result<bool, DbError> {
    let now = now_rfc3339();
    let detail_json = detail.map(serde_json::to_string).transpose()?;

    let inserted = conn.execute(
        "INSERT INTO signals (property_id, source, source_record_id, signal_type,
                              signal_weight, detail, event_date, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(source, source_record_id) DO NOTHING",
        params![
            property_id,
            source,
            source_record_id,
            signal_type.as_ref(),
            signal_weight,
            detail_json,
            event_date,
            now
        ],
    )?;

    Ok(inserted > 0)
}

/// Finds the closest property within `threshold` degrees of the given
/// coordinates, by Manhattan distance. Returns `None` when either
/// coordinate is absent or nothing is within the box.
///
/// `exclude_id` leaves one property out of consideration; the audit pass
/// uses it to ask for the nearest property *other than* the anchor.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn find_nearby_property(
    conn: &Connection,
    latitude: Option<f64>,
    longitude: Option<f64>,
    threshold: f64,
    exclude_id: Option<i64>,
) -> Result<Option<NearbyProperty>, DbError> {
    let (Some(lat), Some(lng)) = (latitude, longitude) else {
        return Ok(None);
    };

    let row = conn
        .query_row(
            "SELECT id, address_raw, address_norm,
                    ABS(latitude - ?1) + ABS(longitude - ?2) AS dist
             FROM properties
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL
               AND ABS(latitude - ?1) < ?3 AND ABS(longitude - ?2) < ?3
               AND (?4 IS NULL OR id != ?4)
             ORDER BY dist LIMIT 1",
            params![lat, lng, threshold, exclude_id],
            |row| {
                Ok(NearbyProperty {
                    id: row.get(0)?,
                    address_raw: row.get(1)?,
                    address_norm: row.get(2)?,
                    distance_degrees: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(row)
}

/// Appends a normalization-issue row. Audit trail only; nothing reads
/// these back during scoring.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
#[allow(clippy::too_many_arguments)]
pub fn log_normalization_issue(
    conn: &Connection,
    address_raw: Option<&str>,
    address_norm: &str,
    source: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    nearest_property_id: i64,
    distance_meters: f64,
) -> Result<(), DbError> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO normalization_issues
         (address_raw, address_norm, source, latitude, longitude,
          nearest_property_id, distance_meters, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            address_raw,
            address_norm,
            source,
            latitude,
            longitude,
            nearest_property_id,
            distance_meters,
            now
        ],
    )?;

    Ok(())
}

/// Opens a pipeline-run row in `running` status and returns its id.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn start_run(conn: &Connection, sources: &[String]) -> Result<i64, DbError> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO pipeline_runs (started_at, sources, status) VALUES (?1, ?2, 'running')",
        params![now, sources.join(",")],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Closes a pipeline-run row with final counts.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub fn complete_run(
    conn: &Connection,
    run_id: i64,
    properties_count: u64,
    signals_count: u64,
) -> Result<(), DbError> {
    let now = now_rfc3339();
    conn.execute(
        "UPDATE pipeline_runs SET completed_at = ?1, properties_count = ?2,
         signals_count = ?3, status = 'completed' WHERE id = ?4",
        params![
            now,
            i64::try_from(properties_count).unwrap_or(i64::MAX),
            i64::try_from(signals_count).unwrap_or(i64::MAX),
            run_id
        ],
    )?;
    Ok(())
}

/// Writes the scorer's output back onto a property.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub fn update_property_score(
    conn: &Connection,
    property_id: i64,
    total_score: f64,
    tier: Tier,
) -> Result<(), DbError> {
    conn.execute(
        "UPDATE properties SET total_score = ?1, tier = ?2 WHERE id = ?3",
        params![total_score, tier.as_ref(), property_id],
    )?;
    Ok(())
}
