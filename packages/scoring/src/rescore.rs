//! Batch rescoring over the store.

use chrono::{DateTime, Utc};
use distress_map_database::{queries, store};
use rusqlite::Connection;

use crate::{ScoringConfig, ScoringError, SignalInput, score_signals};

/// Recomputes `total_score` and `tier` for every property from its
/// stored signals. Returns the number of properties scored.
///
/// `now` is injected so runs are reproducible under test; callers pass
/// `Utc::now()` in production.
///
/// # Errors
///
/// Returns [`ScoringError`] if any database operation fails.
pub fn rescore_all(
    conn: &Connection,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Result<u64, ScoringError> {
    let property_ids = queries::all_property_ids(conn)?;
    let mut scored: u64 = 0;

    for property_id in property_ids {
        let rows = queries::signals_for_property(conn, property_id)?;
        let signals: Vec<SignalInput> = rows.iter().map(SignalInput::from_row).collect();

        let score = score_signals(&signals, config, now);
        store::update_property_score(conn, property_id, score.total, score.tier)?;
        scored += 1;
    }

    log::info!("Rescored {scored} properties");
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use distress_map_database::db::open_in_memory;
    use distress_map_signal_models::{SignalType, Tier};
    use serde_json::json;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn rescore_writes_scores_and_tiers() {
        let conn = open_in_memory().unwrap();
        let config = ScoringConfig::default();

        let hot = store::upsert_property(&conn, "1 A ST", "1 A ST", None, None, None, None).unwrap();
        store::upsert_signal(
            &conn,
            hot,
            "code_violations",
            "cv-1",
            SignalType::UnfitBuilding,
            0.0,
            None,
            None,
        )
        .unwrap();
        store::upsert_signal(
            &conn,
            hot,
            "urm",
            "urm-1",
            SignalType::UrmHighRiskNoRetrofit,
            0.0,
            None,
            None,
        )
        .unwrap();

        let quiet =
            store::upsert_property(&conn, "2 B ST", "2 B ST", None, None, None, None).unwrap();
        store::upsert_signal(
            &conn,
            quiet,
            "permits",
            "p-1",
            SignalType::ExpiredPermitMinor,
            0.0,
            None,
            None,
        )
        .unwrap();

        let scored = rescore_all(&conn, &config, fixed_now()).unwrap();
        assert_eq!(scored, 2);

        let rows = queries::top_properties(&conn, 10).unwrap();
        // 12 + 6 + 5 (two sources) = 23 -> tier B; 2 -> tier C
        assert_eq!(rows[0].id, hot);
        assert!((rows[0].total_score - 23.0).abs() < 1e-9);
        assert_eq!(rows[0].tier, Tier::B);
        assert_eq!(rows[1].tier, Tier::C);
    }

    #[test]
    fn rescore_twice_changes_nothing() {
        let conn = open_in_memory().unwrap();
        let config = ScoringConfig::default();

        let id = store::upsert_property(&conn, "1 A ST", "1 A ST", None, None, None, None).unwrap();
        store::upsert_signal(
            &conn,
            id,
            "code_violations",
            "cv-1",
            SignalType::VacantBuilding,
            0.0,
            Some(&json!({"status": "CLOSED"})),
            Some("2024-06-01"),
        )
        .unwrap();

        rescore_all(&conn, &config, fixed_now()).unwrap();
        let first = queries::top_properties(&conn, 1).unwrap();
        rescore_all(&conn, &config, fixed_now()).unwrap();
        let second = queries::top_properties(&conn, 1).unwrap();

        assert!((first[0].total_score - second[0].total_score).abs() < f64::EPSILON);
        assert_eq!(first[0].tier, second[0].tier);
    }

    #[test]
    fn status_comes_from_detail_payload() {
        let conn = open_in_memory().unwrap();
        let config = ScoringConfig::default();

        let id = store::upsert_property(&conn, "1 A ST", "1 A ST", None, None, None, None).unwrap();
        store::upsert_signal(
            &conn,
            id,
            "code_violations",
            "cv-1",
            SignalType::VacantBuilding,
            0.0,
            Some(&json!({"status": "CLOSED", "record_type": "VACANT BUILDING"})),
            None,
        )
        .unwrap();

        rescore_all(&conn, &config, fixed_now()).unwrap();
        let rows = queries::top_properties(&conn, 1).unwrap();
        // 10 x 0.4 status multiplier
        assert!((rows[0].total_score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn stale_only_property_scores_zero_tier_c() {
        let conn = open_in_memory().unwrap();
        let config = ScoringConfig::default();

        let id = store::upsert_property(&conn, "1 A ST", "1 A ST", None, None, None, None).unwrap();
        store::upsert_signal(
            &conn,
            id,
            "fire_911",
            "f-1",
            SignalType::ResidentialFire,
            0.0,
            None,
            Some("2015-01-01"),
        )
        .unwrap();

        rescore_all(&conn, &config, fixed_now()).unwrap();
        let rows = queries::top_properties(&conn, 1).unwrap();
        assert!((rows[0].total_score - 0.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].tier, Tier::C);
    }
}
