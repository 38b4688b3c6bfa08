//! Building Permits source.
//!
//! Dataset: <https://data.seattle.gov/resource/76t5-zqzr>
//!
//! Only distress-relevant permits are requested: expired, canceled, or
//! demolition permits within the covered zip codes.

use async_trait::async_trait;
use distress_map_signal_models::{ExtractedSignal, SignalType};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::{DATASET_PERMITS, zips_in_clause};
use crate::parsing::{get_str, get_upper, parse_coords, parse_f64};
use crate::soda::{SodaConfig, fetch_soda_pages};
use crate::{DistressSource, RecordPage, SourceError};

/// Expired permits above this estimated project cost count as major.
const MAJOR_COST_THRESHOLD: f64 = 50_000.0;

/// Expired/canceled/demolition permit fetcher.
#[derive(Debug)]
pub struct PermitsSource;

impl PermitsSource {
    /// Creates the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn classify(status: &str, description: &str, est_cost: Option<f64>) -> SignalType {
        if description.contains("DEMOLISH") || description.contains("DEMOLITION") {
            SignalType::Demolished
        } else if status == "EXPIRED" {
            if est_cost.unwrap_or(0.0) > MAJOR_COST_THRESHOLD {
                SignalType::ExpiredPermitMajor
            } else {
                SignalType::ExpiredPermitMinor
            }
        } else if status == "CANCELED" {
            SignalType::PermitCancelled
        } else {
            SignalType::ExpiredPermitMinor
        }
    }
}

impl Default for PermitsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistressSource for PermitsSource {
    fn source_name(&self) -> &'static str {
        "permits"
    }

    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
        let where_clause = format!(
            "{} AND (statuscurrent = 'Expired' OR statuscurrent = 'Canceled' OR \
             upper(description) like '%DEMOLISH%' OR upper(description) like '%DEMOLITION%')",
            zips_in_clause("originalzip")
        );
        fetch_soda_pages(
            &SodaConfig {
                dataset_id: DATASET_PERMITS,
                where_clause,
                label: "permits",
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
        let record_id = get_str(record, "permitnum")
            .or_else(|| get_str(record, ":id"))
            .unwrap_or_default()
            .to_string();
        let status = get_upper(record, "statuscurrent");
        let description = get_upper(record, "description");
        let est_cost = parse_f64(record.get("estprojectcost"));

        let signal_type = Self::classify(&status, &description, est_cost);

        let permit_type = {
            let desc = get_str(record, "permittypedesc").unwrap_or_default();
            if desc.is_empty() {
                get_str(record, "permittypemapped").unwrap_or_default()
            } else {
                desc
            }
        };

        let event_date = get_str(record, "applieddate")
            .or_else(|| get_str(record, "issueddate"))
            .map(str::to_string);

        vec![ExtractedSignal {
            source_record_id: record_id,
            signal_type,
            detail: json!({
                "status": status,
                "description": get_str(record, "description").unwrap_or_default(),
                "est_cost": record.get("estprojectcost").cloned().unwrap_or(serde_json::Value::Null),
                "permit_type": permit_type,
            }),
            event_date,
        }]
    }
}
