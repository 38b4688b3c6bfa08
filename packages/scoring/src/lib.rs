#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Property scoring: weighted, time-decayed signal sums with status
//! multipliers, a multi-source bonus, and tier assignment.
//!
//! The formula is a pure function of `(signals, config, now)` and lives
//! here alone. The batch rescore and any read-side per-source breakdown
//! both call it, so the two can never drift apart.

pub mod config;
pub mod rescore;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use distress_map_database_models::SignalRow;
use distress_map_signal_models::Tier;

pub use crate::config::ScoringConfig;
pub use crate::rescore::rescore_all;

/// Errors that can occur while loading config or rescoring.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// Reading the config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing the config file failed.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The config does not cover every signal type.
    #[error("signal_weights missing entries for: {}", missing.join(", "))]
    MissingWeights {
        /// The uncovered signal-type names.
        missing: Vec<String>,
    },

    /// A database operation failed during rescoring.
    #[error("Database error: {0}")]
    Db(#[from] distress_map_database::DbError),
}

/// The scoring-relevant view of one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalInput {
    /// Source name the signal came from.
    pub source: String,
    /// Persisted signal-type string.
    pub signal_type: String,
    /// ISO-8601 event date, if any.
    pub event_date: Option<String>,
    /// The `status` entry of the detail payload, if any.
    pub status: Option<String>,
}

impl SignalInput {
    /// Builds a scoring input from a stored signal row, pulling `status`
    /// out of the JSON detail payload.
    #[must_use]
    pub fn from_row(row: &SignalRow) -> Self {
        let status = row
            .detail
            .as_deref()
            .and_then(|detail| serde_json::from_str::<serde_json::Value>(detail).ok())
            .and_then(|detail| {
                detail
                    .get("status")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            });

        Self {
            source: row.source.clone(),
            signal_type: row.signal_type.clone(),
            event_date: row.event_date.clone(),
            status,
        }
    }
}

/// Scorer output for one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// Accumulated total.
    pub total: f64,
    /// Tier bucket derived from the total.
    pub tier: Tier,
}

/// Parses an ISO-8601 event date, tolerating a date-only form, a naive
/// datetime, and an offset datetime.
#[must_use]
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// One signal's contribution to the total, or `None` when the signal is
/// outside the recency window and must be skipped entirely.
fn signal_contribution(
    signal: &SignalInput,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Option<f64> {
    let base_weight = config.weight(&signal.signal_type);
    let max_age_seconds = i64::from(config.recency.max_age_days) * 86_400;

    // Missing or unparseable dates leave the signal counted at 1.0x.
    let decay_mult = match signal.event_date.as_deref().and_then(parse_event_date) {
        Some(event) => {
            let age_seconds = (now - event).num_seconds();
            if age_seconds > max_age_seconds {
                return None;
            }
            #[allow(clippy::cast_precision_loss)]
            let age_days = age_seconds.max(0) as f64 / 86_400.0;
            let ramp = (1.0 - age_days / f64::from(config.recency.max_age_days)).max(0.0);
            1.0 + config.recency.decay_boost * ramp
        }
        None => 1.0,
    };

    let status_mult = config.status_multiplier(&signal.source, signal.status.as_deref());

    Some(base_weight * decay_mult * status_mult)
}

/// Computes the total score and tier for one property's signals.
///
/// Pure in `(signals, config, now)`: no clock reads, no I/O.
#[must_use]
pub fn score_signals(signals: &[SignalInput], config: &ScoringConfig, now: DateTime<Utc>) -> Score {
    let mut total = 0.0;
    let mut sources: BTreeSet<&str> = BTreeSet::new();

    for signal in signals {
        if let Some(contribution) = signal_contribution(signal, config, now) {
            total += contribution;
            sources.insert(&signal.source);
        }
    }

    if sources.len() >= config.bonuses.multi_source_threshold {
        total += config.bonuses.multi_source_points;
    }

    let tier = if total >= config.tiers.a {
        Tier::A
    } else if total >= config.tiers.b {
        Tier::B
    } else {
        Tier::C
    };

    Score { total, tier }
}

/// Per-source contribution sums for one property, using the exact same
/// per-signal formula as [`score_signals`]. The multi-source bonus is not
/// attributed to any source.
#[must_use]
pub fn source_breakdown(
    signals: &[SignalInput],
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> BTreeMap<String, f64> {
    let mut breakdown: BTreeMap<String, f64> = BTreeMap::new();

    for signal in signals {
        if let Some(contribution) = signal_contribution(signal, config, now) {
            *breakdown.entry(signal.source.clone()).or_default() += contribution;
        }
    }

    breakdown
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn signal(source: &str, signal_type: &str, event_date: Option<String>) -> SignalInput {
        SignalInput {
            source: source.to_string(),
            signal_type: signal_type.to_string(),
            event_date,
            status: None,
        }
    }

    #[test]
    fn undated_signal_counts_at_base_weight() {
        let config = ScoringConfig::default();
        let signals = vec![signal("urm", "urm_no_retrofit", None)];
        let score = score_signals(&signals, &config, fixed_now());
        assert!((score.total - 4.0).abs() < 1e-9);
        assert_eq!(score.tier, Tier::C);
    }

    #[test]
    fn fresh_signal_gets_full_decay_boost() {
        let config = ScoringConfig::default();
        let now = fixed_now();
        let signals = vec![signal(
            "code_violations",
            "vacant_building",
            Some(now.to_rfc3339()),
        )];
        let score = score_signals(&signals, &config, now);
        // 10 x (1 + 0.5 x 1.0)
        assert!((score.total - 15.0).abs() < 1e-9);
    }

    #[test]
    fn window_boundary_is_one_second_wide() {
        let config = ScoringConfig::default();
        let now = fixed_now();
        let max_age = Duration::days(i64::from(config.recency.max_age_days));

        let just_inside = vec![signal(
            "code_violations",
            "vacant_building",
            Some((now - max_age + Duration::seconds(1)).to_rfc3339()),
        )];
        let inside_score = score_signals(&just_inside, &config, now);
        assert!(inside_score.total > 0.0);

        let just_outside = vec![signal(
            "code_violations",
            "vacant_building",
            Some((now - max_age - Duration::seconds(1)).to_rfc3339()),
        )];
        let outside_score = score_signals(&just_outside, &config, now);
        assert!((outside_score.total - 0.0).abs() < f64::EPSILON);
        assert_eq!(outside_score.tier, Tier::C);
    }

    #[test]
    fn skipped_signals_do_not_feed_the_source_bonus() {
        let config = ScoringConfig::default();
        let now = fixed_now();
        let old = (now - Duration::days(4000)).to_rfc3339();

        // Two distinct sources, both outside the window: no bonus.
        let signals = vec![
            signal("code_violations", "vacant_building", Some(old.clone())),
            signal("permits", "demolished", Some(old)),
        ];
        let score = score_signals(&signals, &config, now);
        assert!((score.total - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn status_multiplier_reduces_contribution() {
        let config = ScoringConfig::default();
        let mut closed = signal("code_violations", "vacant_building", None);
        closed.status = Some("CLOSED".to_string());

        let score = score_signals(&[closed], &config, fixed_now());
        assert!((score.total - 4.0).abs() < 1e-9); // 10 x 0.4
    }

    #[test]
    fn negative_weights_lower_the_total() {
        let config = ScoringConfig::default();
        let signals = vec![
            signal("urm", "urm_high_risk_no_retrofit", None),
            signal("king_county_sales", "recently_sold", None),
        ];
        let score = score_signals(&signals, &config, fixed_now());
        // 6 - 8 + 5 (two sources) = 3
        assert!((score.total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn multi_source_bonus_and_tiering() {
        let mut config = ScoringConfig::default();
        config.tiers.a = 15.0;
        config.tiers.b = 8.0;
        config
            .signal_weights
            .insert("vacant_building".to_string(), 7.0);
        config.signal_weights.insert("complaint_other".to_string(), 0.0);

        let one_source = vec![signal("code_violations", "vacant_building", None)];
        let score = score_signals(&one_source, &config, fixed_now());
        assert!((score.total - 7.0).abs() < 1e-9);
        assert_eq!(score.tier, Tier::C);

        let two_sources = vec![
            signal("code_violations", "vacant_building", None),
            signal("urm", "complaint_other", None),
        ];
        let score = score_signals(&two_sources, &config, fixed_now());
        assert!((score.total - 12.0).abs() < 1e-9);
        assert_eq!(score.tier, Tier::B);
    }

    #[test]
    fn exactly_threshold_sources_triggers_bonus() {
        let config = ScoringConfig::default();
        let signals = vec![
            signal("code_violations", "complaint_other", None),
            signal("permits", "expired_permit_minor", None),
        ];
        let score = score_signals(&signals, &config, fixed_now());
        // 1 + 2 + 5 = 8 with the default threshold of 2.
        assert!((score.total - 8.0).abs() < 1e-9);
    }

    #[test]
    fn scorer_is_pure() {
        let config = ScoringConfig::default();
        let now = fixed_now();
        let signals = vec![
            signal(
                "code_violations",
                "vacant_building",
                Some("2024-06-01".to_string()),
            ),
            signal("permits", "demolished", None),
        ];

        let first = score_signals(&signals, &config, now);
        let second = score_signals(&signals, &config, now);
        assert_eq!(first, second);
    }

    #[test]
    fn breakdown_sums_to_total_minus_bonus() {
        let config = ScoringConfig::default();
        let now = fixed_now();
        let signals = vec![
            signal("code_violations", "vacant_building", None),
            signal("code_violations", "citation", None),
            signal("permits", "demolished", None),
        ];

        let score = score_signals(&signals, &config, now);
        let breakdown = source_breakdown(&signals, &config, now);

        let sum: f64 = breakdown.values().sum();
        assert!((sum + config.bonuses.multi_source_points - score.total).abs() < 1e-9);
        assert!((breakdown["code_violations"] - 17.0).abs() < 1e-9);
        assert!((breakdown["permits"] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn parses_event_date_forms() {
        assert!(parse_event_date("2024-06-01").is_some());
        assert!(parse_event_date("2024-06-01T12:30:00.000").is_some());
        assert!(parse_event_date("2024-06-01T12:30:00Z").is_some());
        assert!(parse_event_date("06/01/2024").is_none());
    }
}
