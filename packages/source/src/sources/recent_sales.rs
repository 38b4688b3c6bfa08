//! Recent sales via the Redfin CSV export endpoint.
//!
//! Best-effort coverage: the export returns a few dozen results per zip
//! code and may answer with an HTML block page or JSON error at any
//! time. A bad response for one zip yields zero records and is logged;
//! it never fails the source.

use std::time::Duration;

use async_trait::async_trait;
use distress_map_signal_models::{ExtractedSignal, SignalType};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::WEST_SEATTLE_ZIPS;
use crate::parsing::{get_str, parse_coords, to_iso_date};
use crate::{DistressSource, RecordPage, SourceError};

const REDFIN_CSV_URL: &str = "https://www.redfin.com/stingray/api/gis-csv";

/// Fixed query parameters: zip-code region type, sold within a year,
/// house/condo/townhouse.
const REDFIN_PARAMS: &[(&str, &str)] = &[
    ("al", "1"),
    ("market", "seattle"),
    ("region_type", "2"),
    ("sold_within_days", "365"),
    ("status", "9"),
    ("uipt", "1,2,3"),
    ("v", "8"),
];

/// The endpoint blocks non-browser agents.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/120.0.0.0 Safari/537.36";

/// Delay between per-zip requests.
const REQUEST_DELAY: Duration = Duration::from_secs(2);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Recent-sales fetcher.
#[derive(Debug)]
pub struct RecentSalesSource;

impl RecentSalesSource {
    /// Creates the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parses a CSV response body into one record per row, keyed by the
    /// header names. Returns an empty list for anything that does not
    /// look like CSV.
    fn parse_csv_body(body: &str) -> Vec<serde_json::Value> {
        let text = body.trim();
        if text.is_empty() || text.starts_with("<!") || text.starts_with('{') {
            return Vec::new();
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let Ok(headers) = reader.headers() else {
            return Vec::new();
        };
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_owned()).collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let Ok(row) = result else {
                continue;
            };
            let mut map = serde_json::Map::new();
            for (i, header) in headers.iter().enumerate() {
                let value = row.get(i).unwrap_or("").trim().to_owned();
                map.insert(header.clone(), serde_json::Value::String(value));
            }

            // The endpoint sometimes returns neighboring zips; keep only
            // covered ones.
            let row_zip = map
                .get("ZIP OR POSTAL CODE")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            if WEST_SEATTLE_ZIPS.contains(&row_zip) {
                records.push(serde_json::Value::Object(map));
            }
        }

        records
    }

    async fn fetch_zip(
        client: &reqwest::Client,
        zip_code: &str,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let response = client
            .get(REDFIN_CSV_URL)
            .query(REDFIN_PARAMS)
            .query(&[("region_id", zip_code)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            log::warn!(
                "king_county_sales: HTTP {} for zip {zip_code}",
                response.status()
            );
            return Ok(Vec::new());
        }

        let body = response.text().await?;
        Ok(Self::parse_csv_body(&body))
    }
}

impl Default for RecentSalesSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistressSource for RecentSalesSource {
    fn source_name(&self) -> &'static str {
        "king_county_sales"
    }

    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let mut total: u64 = 0;

        for zip_code in WEST_SEATTLE_ZIPS {
            match Self::fetch_zip(&client, zip_code).await {
                Ok(records) if !records.is_empty() => {
                    total += records.len() as u64;
                    tx.send(records).await?;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("king_county_sales: fetch failed for {zip_code}: {e}");
                }
            }
            tokio::time::sleep(REQUEST_DELAY).await;
        }

        log::info!("king_county_sales: {total} sale rows fetched");
        Ok(total)
    }

    fn extract_address(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "ADDRESS")
            .filter(|a| !a.is_empty())
            .map(str::to_string)
    }

    fn extract_coords(&self, record: &serde_json::Value) -> (Option<f64>, Option<f64>) {
        parse_coords(record, "LATITUDE", "LONGITUDE")
    }

    fn extract_zip(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "ZIP OR POSTAL CODE")
            .filter(|z| !z.is_empty())
            .map(str::to_string)
    }

    fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal> {
        let address = get_str(record, "ADDRESS").unwrap_or_default();
        let mls = get_str(record, "MLS#").unwrap_or_default();
        let source_record_id = if mls.is_empty() {
            format!("redfin-{address}")
        } else {
            format!("redfin-{mls}")
        };

        let sold_date_raw = get_str(record, "SOLD DATE").unwrap_or_default();

        vec![ExtractedSignal {
            source_record_id,
            signal_type: SignalType::RecentlySold,
            detail: json!({
                "price": get_str(record, "PRICE").unwrap_or_default(),
                "sale_type": get_str(record, "SALE TYPE").unwrap_or_default(),
                "property_type": get_str(record, "PROPERTY TYPE").unwrap_or_default(),
                "sold_date": sold_date_raw,
                "status": "sold",
            }),
            event_date: to_iso_date(sold_date_raw),
        }]
    }
}
