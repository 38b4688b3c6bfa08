//! Read-side query functions over the store.
//!
//! This is the surface external collaborators (dashboard, bots, tools)
//! consume. Filters are assembled dynamically into a WHERE clause with a
//! positional parameter vector; sort columns come from the
//! [`PropertyOrder`](distress_map_database_models::PropertyOrder)
//! whitelist, never from caller strings.

use std::fmt::Write as _;

use distress_map_database_models::{
    PropertyQuery, PropertyRow, RunRow, SignalRow, SourceCount, TierCount, ZipCount,
};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::DbError;

fn map_property_row(row: &Row<'_>) -> rusqlite::Result<PropertyRow> {
    let tier: String = row.get("tier")?;
    Ok(PropertyRow {
        id: row.get("id")?,
        address_raw: row.get("address_raw")?,
        address_norm: row.get("address_norm")?,
        zip_code: row.get("zip_code")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        property_type: row.get("property_type")?,
        total_score: row.get("total_score")?,
        tier: tier.parse().unwrap_or_default(),
        first_seen: row.get("first_seen")?,
        last_updated: row.get("last_updated")?,
    })
}

fn map_signal_row(row: &Row<'_>) -> rusqlite::Result<SignalRow> {
    Ok(SignalRow {
        id: row.get("id")?,
        property_id: row.get("property_id")?,
        source: row.get("source")?,
        source_record_id: row.get("source_record_id")?,
        signal_type: row.get("signal_type")?,
        signal_weight: row.get("signal_weight")?,
        detail: row.get("detail")?,
        event_date: row.get("event_date")?,
        fetched_at: row.get("fetched_at")?,
    })
}

/// Queries properties with optional tier/zip/source/score/search filters,
/// a whitelisted sort order, and paging.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn query_properties(
    conn: &Connection,
    query: &PropertyQuery,
) -> Result<Vec<PropertyRow>, DbError> {
    let mut sql = String::from(
        "SELECT id, address_raw, address_norm, zip_code, latitude, longitude,
                property_type, total_score, tier, first_seen, last_updated
         FROM properties WHERE 1=1",
    );
    let mut params: Vec<Value> = Vec::new();

    if let Some(tier) = query.tier {
        sql.push_str(" AND tier = ?");
        params.push(Value::Text(tier.to_string()));
    }

    if let Some(zip) = &query.zip {
        sql.push_str(" AND zip_code = ?");
        params.push(Value::Text(zip.clone()));
    }

    if let Some(source) = &query.source {
        sql.push_str(" AND EXISTS (SELECT 1 FROM signals s WHERE s.property_id = properties.id AND s.source = ?)");
        params.push(Value::Text(source.clone()));
    }

    if let Some(min_score) = query.min_score {
        sql.push_str(" AND total_score >= ?");
        params.push(Value::Real(min_score));
    }

    if let Some(search) = &query.search {
        sql.push_str(
            " AND (address_norm LIKE '%' || ? || '%' OR address_raw LIKE '%' || ? || '%')",
        );
        params.push(Value::Text(search.clone()));
        params.push(Value::Text(search.clone()));
    }

    write!(sql, " ORDER BY {} LIMIT ? OFFSET ?", query.order.sql()).unwrap();
    params.push(Value::Integer(i64::from(query.limit)));
    params.push(Value::Integer(i64::from(query.offset)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), map_property_row)?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Returns every signal attached to a property.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn signals_for_property(
    conn: &Connection,
    property_id: i64,
) -> Result<Vec<SignalRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, property_id, source, source_record_id, signal_type,
                signal_weight, detail, event_date, fetched_at
         FROM signals WHERE property_id = ?1",
    )?;
    let rows = stmt.query_map(params![property_id], map_signal_row)?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Returns the ids of every property, for batch rescoring.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn all_property_ids(conn: &Connection) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare("SELECT id FROM properties ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Property counts grouped by tier.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn tier_counts(conn: &Connection) -> Result<Vec<TierCount>, DbError> {
    let mut stmt =
        conn.prepare("SELECT tier, COUNT(*) FROM properties GROUP BY tier ORDER BY tier")?;
    let rows = stmt.query_map([], |row| {
        let tier: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok(TierCount {
            tier: tier.parse().unwrap_or_default(),
            count: u64::try_from(count).unwrap_or(0),
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Property counts grouped by zip code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn zip_counts(conn: &Connection) -> Result<Vec<ZipCount>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT zip_code, COUNT(*) FROM properties GROUP BY zip_code ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        let count: i64 = row.get(1)?;
        Ok(ZipCount {
            zip_code: row.get(0)?,
            count: u64::try_from(count).unwrap_or(0),
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Signal counts grouped by source.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn source_counts(conn: &Connection) -> Result<Vec<SourceCount>, DbError> {
    let mut stmt = conn
        .prepare("SELECT source, COUNT(*) FROM signals GROUP BY source ORDER BY COUNT(*) DESC")?;
    let rows = stmt.query_map([], |row| {
        let count: i64 = row.get(1)?;
        Ok(SourceCount {
            source: row.get(0)?,
            count: u64::try_from(count).unwrap_or(0),
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The top `limit` properties by total score.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn top_properties(conn: &Connection, limit: u32) -> Result<Vec<PropertyRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, address_raw, address_norm, zip_code, latitude, longitude,
                property_type, total_score, tier, first_seen, last_updated
         FROM properties ORDER BY total_score DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], map_property_row)?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Properties that received at least one signal from `source` and have
/// coordinates. Input set for the normalization-audit pass.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn properties_with_signals_from(
    conn: &Connection,
    source: &str,
) -> Result<Vec<PropertyRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT p.id, p.address_raw, p.address_norm, p.zip_code,
                p.latitude, p.longitude, p.property_type, p.total_score,
                p.tier, p.first_seen, p.last_updated
         FROM properties p
         JOIN signals s ON s.property_id = p.id
         WHERE s.source = ?1
           AND p.latitude IS NOT NULL AND p.longitude IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![source], map_property_row)?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Total number of properties.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn property_count(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM properties", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Total number of signals.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn signal_count(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Total number of normalization issues.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn issue_count(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM normalization_issues", [], |row| {
            row.get(0)
        })?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// The most recent pipeline runs, newest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn recent_runs(conn: &Connection, limit: u32) -> Result<Vec<RunRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, started_at, completed_at, sources, properties_count,
                signals_count, status
         FROM pipeline_runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(RunRow {
            id: row.get(0)?,
            started_at: row.get(1)?,
            completed_at: row.get(2)?,
            sources: row.get(3)?,
            properties_count: row.get(4)?,
            signals_count: row.get(5)?,
            status: row.get(6)?,
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use distress_map_database_models::PropertyOrder;
    use distress_map_signal_models::{SignalType, Tier};

    use super::*;
    use crate::db::open_in_memory;
    use crate::store::{update_property_score, upsert_property, upsert_signal};

    fn seed(conn: &Connection) {
        let a = upsert_property(
            conn,
            "1 A ST",
            "1 A ST",
            Some("98106"),
            Some(47.5),
            Some(-122.3),
            None,
        )
        .unwrap();
        let b = upsert_property(conn, "2 B ST", "2 B ST", Some("98116"), None, None, None).unwrap();

        upsert_signal(
            conn,
            a,
            "code_violations",
            "cv-1",
            SignalType::VacantBuilding,
            0.0,
            None,
            None,
        )
        .unwrap();
        upsert_signal(
            conn,
            a,
            "permits",
            "p-1",
            SignalType::Demolished,
            0.0,
            None,
            None,
        )
        .unwrap();
        upsert_signal(
            conn,
            b,
            "permits",
            "p-2",
            SignalType::ExpiredPermitMinor,
            0.0,
            None,
            None,
        )
        .unwrap();

        update_property_score(conn, a, 20.0, Tier::A).unwrap();
        update_property_score(conn, b, 3.0, Tier::C).unwrap();
    }

    #[test]
    fn filters_by_tier_and_source() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let by_tier = query_properties(
            &conn,
            &PropertyQuery {
                tier: Some(Tier::A),
                ..PropertyQuery::default()
            },
        )
        .unwrap();
        assert_eq!(by_tier.len(), 1);
        assert_eq!(by_tier[0].address_norm, "1 A ST");

        let by_source = query_properties(
            &conn,
            &PropertyQuery {
                source: Some("code_violations".to_string()),
                ..PropertyQuery::default()
            },
        )
        .unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].address_norm, "1 A ST");
    }

    #[test]
    fn filters_by_min_score_and_search() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let scored = query_properties(
            &conn,
            &PropertyQuery {
                min_score: Some(10.0),
                ..PropertyQuery::default()
            },
        )
        .unwrap();
        assert_eq!(scored.len(), 1);

        let searched = query_properties(
            &conn,
            &PropertyQuery {
                search: Some("B ST".to_string()),
                order: PropertyOrder::AddressAsc,
                ..PropertyQuery::default()
            },
        )
        .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].address_norm, "2 B ST");
    }

    #[test]
    fn counts_group_correctly() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let tiers = tier_counts(&conn).unwrap();
        assert_eq!(tiers.len(), 2);

        let sources = source_counts(&conn).unwrap();
        let permits = sources.iter().find(|s| s.source == "permits").unwrap();
        assert_eq!(permits.count, 2);

        assert_eq!(property_count(&conn).unwrap(), 2);
        assert_eq!(signal_count(&conn).unwrap(), 3);
    }

    #[test]
    fn top_properties_orders_by_score() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        let top = top_properties(&conn, 10).unwrap();
        assert_eq!(top[0].address_norm, "1 A ST");
        assert!(top[0].total_score > top[1].total_score);
    }

    #[test]
    fn audit_input_requires_coordinates() {
        let conn = open_in_memory().unwrap();
        seed(&conn);

        // Both properties have a permits signal, but only one has coords.
        let props = properties_with_signals_from(&conn, "permits").unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].address_norm, "1 A ST");
    }
}
