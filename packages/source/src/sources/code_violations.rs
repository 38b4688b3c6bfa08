//! Code Complaints & Violations source.
//!
//! Dataset: <https://data.seattle.gov/resource/ez4a-iug7>
//!
//! Record fields of interest: `recordnum`, `recordtypedesc`,
//! `recordtypemapped`, `description`, `opendate`, `lastinspresult`,
//! `statuscurrent`, `originaladdress1`, `originalzip`, `latitude`,
//! `longitude`.

use async_trait::async_trait;
use distress_map_signal_models::{ExtractedSignal, SignalType};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::{DATASET_CODE_VIOLATIONS, zips_in_clause};
use crate::parsing::{get_str, get_upper, parse_coords};
use crate::soda::{SodaConfig, fetch_soda_pages};
use crate::{DistressSource, RecordPage, SourceError};

/// Maps record-type text to a signal type, in priority order: the first
/// matching substring wins.
const TYPE_MAP: &[(&str, SignalType)] = &[
    ("UNFIT FOR HABITATION", SignalType::UnfitBuilding),
    ("VACANT BUILDING", SignalType::VacantBuilding),
    ("NOTICE OF VIOLATION", SignalType::NoticeOfViolation),
    ("CITATION", SignalType::Citation),
];

/// Code complaints and violations fetcher.
#[derive(Debug)]
pub struct CodeViolationsSource;

impl CodeViolationsSource {
    /// Creates the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn record_id(record: &serde_json::Value) -> String {
        get_str(record, "recordnum")
            .or_else(|| get_str(record, ":id"))
            .unwrap_or_default()
            .to_string()
    }

    fn primary_type(record_type: &str) -> SignalType {
        for (needle, signal_type) in TYPE_MAP {
            if record_type.contains(needle) {
                return *signal_type;
            }
        }
        if record_type.contains("CONSTRUCTION") {
            SignalType::ComplaintConstruction
        } else if record_type.contains("LANDLORD") {
            SignalType::ComplaintLandlordTenant
        } else {
            SignalType::ComplaintOther
        }
    }
}

impl Default for CodeViolationsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistressSource for CodeViolationsSource {
    fn source_name(&self) -> &'static str {
        "code_violations"
    }

    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
        fetch_soda_pages(
            &SodaConfig {
                dataset_id: DATASET_CODE_VIOLATIONS,
                where_clause: zips_in_clause("originalzip"),
                label: "code_violations",
            },
            tx,
        )
        .await
    }

    fn extract_address(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "originaladdress1").map(str::to_string)
    }

    fn extract_coords(&self, record: &serde_json::Value) -> (Option<f64>, Option<f64>) {
        parse_coords(record, "latitude", "longitude")
    }

    fn extract_zip(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "originalzip").map(str::to_string)
    }

    fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal> {
        let record_id = Self::record_id(record);
        let record_type = {
            let desc = get_upper(record, "recordtypedesc");
            if desc.is_empty() {
                get_upper(record, "recordtypemapped")
            } else {
                desc
            }
        };
        let status = get_upper(record, "statuscurrent");
        let event_date = get_str(record, "opendate").map(str::to_string);

        let primary = Self::primary_type(&record_type);
        let mut signals = Vec::new();

        // The current status can indicate an NOV or citation even when the
        // record type says something else; emit those as extra signals.
        if status.contains("NOTICE OF VIOLATION") && primary != SignalType::NoticeOfViolation {
            signals.push(ExtractedSignal {
                source_record_id: format!("{record_id}_nov"),
                signal_type: SignalType::NoticeOfViolation,
                detail: json!({"record_type": record_type, "status": status}),
                event_date: event_date.clone(),
            });
        }
        if status.contains("CITATION") && primary != SignalType::Citation {
            signals.push(ExtractedSignal {
                source_record_id: format!("{record_id}_citation"),
                signal_type: SignalType::Citation,
                detail: json!({"record_type": record_type, "status": status}),
                event_date: event_date.clone(),
            });
        }

        signals.push(ExtractedSignal {
            source_record_id: record_id,
            signal_type: primary,
            detail: json!({
                "record_type": record_type,
                "status": status,
                "description": get_str(record, "description").unwrap_or_default(),
                "last_inspection_result": get_str(record, "lastinspresult").unwrap_or_default(),
            }),
            event_date,
        });

        signals
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn maps_record_types_by_priority() {
        assert_eq!(
            CodeViolationsSource::primary_type("UNFIT FOR HABITATION - VACANT BUILDING"),
            SignalType::UnfitBuilding
        );
        assert_eq!(
            CodeViolationsSource::primary_type("VACANT BUILDING COMPLAINT"),
            SignalType::VacantBuilding
        );
        assert_eq!(
            CodeViolationsSource::primary_type("CONSTRUCTION SITE COMPLAINT"),
            SignalType::ComplaintConstruction
        );
        assert_eq!(
            CodeViolationsSource::primary_type("SOMETHING ELSE"),
            SignalType::ComplaintOther
        );
    }

    #[test]
    fn status_nov_adds_second_signal() {
        let source = CodeViolationsSource::new();
        let record = json!({
            "recordnum": "C-1001",
            "recordtypedesc": "VACANT BUILDING",
            "statuscurrent": "NOTICE OF VIOLATION",
            "opendate": "2024-02-01T00:00:00.000",
        });

        let signals = source.extract_signals(&record);
        assert_eq!(signals.len(), 2);

        let nov = signals
            .iter()
            .find(|s| s.signal_type == SignalType::NoticeOfViolation)
            .unwrap();
        assert_eq!(nov.source_record_id, "C-1001_nov");

        let primary = signals
            .iter()
            .find(|s| s.signal_type == SignalType::VacantBuilding)
            .unwrap();
        assert_eq!(primary.source_record_id, "C-1001");
    }

    #[test]
    fn status_matching_primary_does_not_duplicate() {
        let source = CodeViolationsSource::new();
        let record = json!({
            "recordnum": "C-1002",
            "recordtypedesc": "NOTICE OF VIOLATION",
            "statuscurrent": "NOTICE OF VIOLATION",
        });

        let signals = source.extract_signals(&record);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::NoticeOfViolation);
    }

    #[test]
    fn extracts_address_and_coords() {
        let source = CodeViolationsSource::new();
        let record = json!({
            "originaladdress1": "5812 SW SPOKANE ST",
            "originalzip": "98106",
            "latitude": "47.5661",
            "longitude": "-122.3668",
        });

        assert_eq!(
            source.extract_address(&record).as_deref(),
            Some("5812 SW SPOKANE ST")
        );
        assert_eq!(source.extract_zip(&record).as_deref(), Some("98106"));
        let (lat, lng) = source.extract_coords(&record);
        assert!(lat.is_some() && lng.is_some());
    }
}
