//! Fire 911 response calls source.
//!
//! Dataset: <https://data.seattle.gov/resource/kzjm-xkqj>
//!
//! Uses a geographic `within_circle` filter instead of a zip whitelist
//! because the dataset has no reliable zip column.

use async_trait::async_trait;
use distress_map_signal_models::{ExtractedSignal, SignalType};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::{DATASET_FIRE_911, FIRE_CENTER_LAT, FIRE_CENTER_LNG, FIRE_RADIUS_METERS};
use crate::parsing::{get_str, get_upper, parse_coords, parse_f64};
use crate::soda::{SodaConfig, fetch_soda_pages};
use crate::{DistressSource, RecordPage, SourceError};

/// Incident-type substrings that indicate property-relevant fires.
const FIRE_TYPE_FILTERS: &[&str] = &[
    "RESIDENTIAL FIRE",
    "BUILDING FIRE",
    "STRUCTURE FIRE",
    "FIRE IN BUILDING",
    "FIRE IN SINGLE",
    "FIRE IN MULTI",
];

/// Fire response call fetcher.
#[derive(Debug)]
pub struct FireCallsSource;

impl FireCallsSource {
    /// Creates the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn classify(incident_type: &str) -> SignalType {
        if ["RESIDENTIAL", "SINGLE FAMILY", "MULTI FAMILY"]
            .iter()
            .any(|t| incident_type.contains(t))
        {
            SignalType::ResidentialFire
        } else {
            SignalType::BuildingFire
        }
    }
}

impl Default for FireCallsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistressSource for FireCallsSource {
    fn source_name(&self) -> &'static str {
        "fire_911"
    }

    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
        let type_filters: Vec<String> = FIRE_TYPE_FILTERS
            .iter()
            .map(|t| format!("upper(type) like '%{t}%'"))
            .collect();
        let where_clause = format!(
            "within_circle(report_location, {FIRE_CENTER_LAT}, {FIRE_CENTER_LNG}, {FIRE_RADIUS_METERS}) AND ({})",
            type_filters.join(" OR ")
        );

        fetch_soda_pages(
            &SodaConfig {
                dataset_id: DATASET_FIRE_911,
                where_clause,
                label: "fire_911",
            },
            tx,
        )
        .await
    }

    fn extract_address(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "address").map(str::to_string)
    }

    fn extract_coords(&self, record: &serde_json::Value) -> (Option<f64>, Option<f64>) {
        let (lat, lng) = parse_coords(record, "latitude", "longitude");
        if lat.is_some() && lng.is_some() {
            return (lat, lng);
        }
        // Fall back to the nested report_location object.
        record.get("report_location").map_or((None, None), |loc| {
            match (
                parse_f64(loc.get("latitude")),
                parse_f64(loc.get("longitude")),
            ) {
                (Some(lat), Some(lng)) => (Some(lat), Some(lng)),
                _ => (None, None),
            }
        })
    }

    fn extract_zip(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "zipcode").map(str::to_string)
    }

    fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal> {
        let record_id = get_str(record, "incident_number")
            .or_else(|| get_str(record, ":id"))
            .unwrap_or_default()
            .to_string();
        let incident_type = get_upper(record, "type");
        let event_date = get_str(record, "datetime").map(str::to_string);

        vec![ExtractedSignal {
            source_record_id: record_id,
            signal_type: Self::classify(&incident_type),
            detail: json!({
                "type": incident_type,
                "datetime": get_str(record, "datetime").unwrap_or_default(),
            }),
            event_date,
        }]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn residential_types_map_to_residential_fire() {
        assert_eq!(
            FireCallsSource::classify("FIRE IN SINGLE FAMILY RES"),
            SignalType::ResidentialFire
        );
        assert_eq!(
            FireCallsSource::classify("RESIDENTIAL FIRE"),
            SignalType::ResidentialFire
        );
        assert_eq!(
            FireCallsSource::classify("STRUCTURE FIRE"),
            SignalType::BuildingFire
        );
    }

    #[test]
    fn nested_report_location_fallback() {
        let source = FireCallsSource::new();
        let record = json!({
            "report_location": {"latitude": "47.561", "longitude": "-122.371"},
        });

        let (lat, lng) = source.extract_coords(&record);
        assert_eq!(lat, Some(47.561));
        assert_eq!(lng, Some(-122.371));
    }

    #[test]
    fn emits_one_signal_with_event_date() {
        let source = FireCallsSource::new();
        let record = json!({
            "incident_number": "F240012345",
            "type": "Fire in Building",
            "datetime": "2024-03-10T04:12:00.000",
        });

        let signals = source.extract_signals(&record);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::BuildingFire);
        assert_eq!(
            signals[0].event_date.as_deref(),
            Some("2024-03-10T04:12:00.000")
        );
    }
}
