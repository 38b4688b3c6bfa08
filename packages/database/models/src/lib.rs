#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row types and query parameter definitions for the distress-map store.

use distress_map_signal_models::Tier;
use serde::{Deserialize, Serialize};

/// A row in the `properties` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRow {
    /// Database primary key.
    pub id: i64,
    /// Address exactly as first received from a source.
    pub address_raw: Option<String>,
    /// Canonical normalized address (globally unique join key).
    pub address_norm: String,
    /// Five-digit zip code, if any source provided one.
    pub zip_code: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Source-provided property type tag; `"unknown"` until a source
    /// supplies something more specific.
    pub property_type: String,
    /// Most recent scorer output.
    pub total_score: f64,
    /// Most recent tier assignment.
    pub tier: Tier,
    /// RFC 3339 timestamp of the first observation.
    pub first_seen: String,
    /// RFC 3339 timestamp of the latest upsert.
    pub last_updated: String,
}

/// A row in the `signals` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRow {
    /// Database primary key.
    pub id: i64,
    /// Owning property.
    pub property_id: i64,
    /// Source name that produced this signal.
    pub source: String,
    /// The source's record identifier (unique per source).
    pub source_record_id: String,
    /// Signal type as persisted text. Kept as a string here so rows
    /// written by a newer taxonomy still load; scoring parses it.
    pub signal_type: String,
    /// Weight stored at ingest time (always 0; real weights live in the
    /// scoring config).
    pub signal_weight: f64,
    /// JSON-encoded per-record payload.
    pub detail: Option<String>,
    /// ISO-8601 event date, when the source provided one.
    pub event_date: Option<String>,
    /// RFC 3339 timestamp of ingestion.
    pub fetched_at: String,
}

/// The nearest neighboring property found by the proximity lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyProperty {
    /// Database primary key of the neighbor.
    pub id: i64,
    /// The neighbor's raw address.
    pub address_raw: Option<String>,
    /// The neighbor's canonical address.
    pub address_norm: String,
    /// Manhattan distance in degrees (latitude delta + longitude delta).
    pub distance_degrees: f64,
}

/// A row in the `pipeline_runs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRow {
    /// Database primary key.
    pub id: i64,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    /// RFC 3339 completion timestamp, `None` while running.
    pub completed_at: Option<String>,
    /// Comma-separated list of selected source names.
    pub sources: Option<String>,
    /// Properties touched during the run.
    pub properties_count: Option<i64>,
    /// New signals inserted during the run.
    pub signals_count: Option<i64>,
    /// `running` or `completed`.
    pub status: String,
}

/// Sort order options for property listings.
///
/// Each variant maps to a fixed ORDER BY clause; callers can never inject
/// arbitrary column names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOrder {
    /// Highest score first.
    #[default]
    ScoreDesc,
    /// Most recently updated first.
    LastUpdatedDesc,
    /// Alphabetical by canonical address.
    AddressAsc,
    /// Grouped by zip code.
    ZipAsc,
}

impl PropertyOrder {
    /// The ORDER BY clause for this option.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::ScoreDesc => "total_score DESC",
            Self::LastUpdatedDesc => "last_updated DESC",
            Self::AddressAsc => "address_norm ASC",
            Self::ZipAsc => "zip_code ASC, total_score DESC",
        }
    }
}

/// Filters and paging for property listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyQuery {
    /// Restrict to a single tier.
    pub tier: Option<Tier>,
    /// Restrict to a single zip code.
    pub zip: Option<String>,
    /// Restrict to properties with at least one signal from this source.
    pub source: Option<String>,
    /// Minimum total score (inclusive).
    pub min_score: Option<f64>,
    /// Substring match against raw or canonical address.
    pub search: Option<String>,
    /// Sort order.
    pub order: PropertyOrder,
    /// Maximum rows to return.
    pub limit: u32,
    /// Rows to skip.
    pub offset: u32,
}

impl Default for PropertyQuery {
    fn default() -> Self {
        Self {
            tier: None,
            zip: None,
            source: None,
            min_score: None,
            search: None,
            order: PropertyOrder::default(),
            limit: 50,
            offset: 0,
        }
    }
}

/// Property count for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCount {
    /// The tier bucket.
    pub tier: Tier,
    /// Number of properties in it.
    pub count: u64,
}

/// Property count for one zip code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipCount {
    /// The zip code (`None` groups properties without one).
    pub zip_code: Option<String>,
    /// Number of properties in it.
    pub count: u64,
}

/// Signal count for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCount {
    /// The source name.
    pub source: String,
    /// Number of signals it produced.
    pub count: u64,
}
