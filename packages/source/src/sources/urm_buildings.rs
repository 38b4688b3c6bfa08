//! Unreinforced Masonry Buildings inventory source.
//!
//! Dataset: <https://data.seattle.gov/resource/54qs-2h7f>
//!
//! This inventory has no natural record id, so signal ids are derived
//! from the address. Coordinates arrive either as flat fields or as a
//! GeoJSON point in `geocoded_column` (`[lng, lat]` order).

use async_trait::async_trait;
use distress_map_signal_models::{ExtractedSignal, SignalType};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::{DATASET_URM, zips_in_clause};
use crate::parsing::{get_str, get_upper, parse_coords, parse_f64};
use crate::soda::{SodaConfig, fetch_soda_pages};
use crate::{DistressSource, RecordPage, SourceError};

/// URM inventory fetcher.
#[derive(Debug)]
pub struct UrmBuildingsSource;

impl UrmBuildingsSource {
    /// Creates the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn classify(retrofit_status: &str, risk_category: &str) -> SignalType {
        // "NO VISIBLE RETROFIT" and "NOT RETROFITTED" both mean no.
        let has_retrofit = retrofit_status.contains("RETROFIT")
            && !retrofit_status.contains("NO")
            && !retrofit_status.contains("NOT")
            && !retrofit_status.contains("NONE");

        if has_retrofit {
            SignalType::UrmRetrofitted
        } else if risk_category.contains("HIGH") {
            SignalType::UrmHighRiskNoRetrofit
        } else {
            SignalType::UrmNoRetrofit
        }
    }
}

impl Default for UrmBuildingsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistressSource for UrmBuildingsSource {
    fn source_name(&self) -> &'static str {
        "urm"
    }

    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
        fetch_soda_pages(
            &SodaConfig {
                dataset_id: DATASET_URM,
                where_clause: zips_in_clause("zip_code"),
                label: "urm",
            },
            tx,
        )
        .await
    }

    fn extract_address(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "address")
            .or_else(|| get_str(record, "street_address"))
            .map(str::to_string)
    }

    fn extract_coords(&self, record: &serde_json::Value) -> (Option<f64>, Option<f64>) {
        // GeoJSON point takes precedence; coordinates are [lng, lat].
        if let Some(coords) = record
            .get("geocoded_column")
            .and_then(|geo| geo.get("coordinates"))
            .and_then(serde_json::Value::as_array)
            && coords.len() >= 2
            && let (Some(lng), Some(lat)) =
                (parse_f64(coords.first()), parse_f64(coords.get(1)))
        {
            return (Some(lat), Some(lng));
        }
        parse_coords(record, "latitude", "longitude")
    }

    fn extract_zip(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "zip_code").map(str::to_string)
    }

    fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal> {
        let record_id = get_str(record, "address")
            .or_else(|| get_str(record, ":id"))
            .unwrap_or_default();
        let retrofit_status = {
            let level = get_upper(record, "retrofit_level");
            if level.is_empty() {
                get_upper(record, "retrofit")
            } else {
                level
            }
        };
        let risk_category = {
            let preliminary = get_upper(record, "preliminary_risk_category");
            if preliminary.is_empty() {
                get_upper(record, "risk_category")
            } else {
                preliminary
            }
        };

        vec![ExtractedSignal {
            source_record_id: format!("urm_{record_id}"),
            signal_type: Self::classify(&retrofit_status, &risk_category),
            detail: json!({
                "retrofit_status": retrofit_status,
                "risk_category": risk_category,
                "building_use": get_str(record, "building_use").unwrap_or_default(),
                "year_built": get_str(record, "year_built").unwrap_or_default(),
                "neighborhood": get_str(record, "neighborhood").unwrap_or_default(),
            }),
            event_date: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn retrofit_text_logic() {
        assert_eq!(
            UrmBuildingsSource::classify("SUBSTANTIAL RETROFIT", "MEDIUM RISK"),
            SignalType::UrmRetrofitted
        );
        assert_eq!(
            UrmBuildingsSource::classify("NO VISIBLE RETROFIT", "HIGH RISK"),
            SignalType::UrmHighRiskNoRetrofit
        );
        assert_eq!(
            UrmBuildingsSource::classify("NO VISIBLE RETROFIT", "MEDIUM RISK"),
            SignalType::UrmNoRetrofit
        );
        assert_eq!(
            UrmBuildingsSource::classify("", "HIGH RISK"),
            SignalType::UrmHighRiskNoRetrofit
        );
    }

    #[test]
    fn geojson_coordinates_are_lng_lat() {
        let source = UrmBuildingsSource::new();
        let record = json!({
            "geocoded_column": {"type": "Point", "coordinates": [-122.3866, 47.5699]},
        });

        let (lat, lng) = source.extract_coords(&record);
        assert_eq!(lat, Some(47.5699));
        assert_eq!(lng, Some(-122.3866));
    }

    #[test]
    fn falls_back_to_flat_coordinates() {
        let source = UrmBuildingsSource::new();
        let record = json!({"latitude": "47.52", "longitude": "-122.36"});

        let (lat, lng) = source.extract_coords(&record);
        assert_eq!(lat, Some(47.52));
        assert_eq!(lng, Some(-122.36));
    }

    #[test]
    fn record_id_derives_from_address() {
        let source = UrmBuildingsSource::new();
        let record = json!({
            "address": "4517 CALIFORNIA AVE SW",
            "retrofit_level": "No Visible Retrofit",
            "preliminary_risk_category": "High Risk",
        });

        let signals = source.extract_signals(&record);
        assert_eq!(signals[0].source_record_id, "urm_4517 CALIFORNIA AVE SW");
        assert_eq!(signals[0].signal_type, SignalType::UrmHighRiskNoRetrofit);
        assert_eq!(signals[0].event_date, None);
    }
}
