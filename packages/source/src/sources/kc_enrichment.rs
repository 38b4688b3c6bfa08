//! King County parcel enrichment source.
//!
//! A single logical source materialized over four inputs, joined in
//! memory on the 10-digit parcel identifier (PIN):
//!
//! 1. the parcel feature service (address, zip, assessed values),
//! 2. the bulk account extract (owner mailing address),
//! 3. the bulk sales extract (last sale per parcel),
//! 4. the foreclosure list.
//!
//! Parcels that would emit no signals are dropped before yielding;
//! enriched records go out in batches of 500.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use distress_map_signal_models::{ExtractedSignal, SignalType};
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::{
    KC_FORECLOSURE_DATASET, KC_GIS_PAGE_SIZE, KC_GIS_PARCELS_URL, KC_GIS_RATE_LIMIT_MS,
    KC_RPACCT_URL, KC_RPSALE_URL, KC_SODA_BASE, WEST_SEATTLE_ZIPS,
};
use crate::download::ensure_downloaded;
use crate::feature_service::{FeatureServiceConfig, fetch_all_features};
use crate::parsing::{get_str, parse_f64, parse_iso_date, to_iso_date};
use crate::{DistressSource, RecordPage, SourceError};

/// Enriched records per yielded batch.
const BATCH_SIZE: usize = 500;

/// Timeout for the single foreclosure-list request.
const FORECLOSURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Improvement/land appraisal ratio below which a parcel is flagged.
const LOW_IMPROVEMENT_RATIO: f64 = 0.3;

struct Parcel {
    address: String,
    zip: String,
    land_val: f64,
    impr_val: f64,
}

struct Mailing {
    city: String,
    state: String,
}

struct Sale {
    date: NaiveDate,
    date_iso: String,
    price: f64,
    buyer: String,
}

/// Builds the 10-digit PIN from the Major (6) and Minor (4) columns,
/// zero-padded.
fn make_pin(major: &str, minor: &str) -> String {
    format!("{:0>6}{:0>4}", major.trim(), minor.trim())
}

/// Splits `"SEATTLE WA"` or `"SEATTLE, WA"` into `(city, state)`. The
/// state is always the trailing two-letter token; anything else leaves
/// the state empty.
fn parse_city_state(text: &str) -> (String, String) {
    let trimmed = text.trim();
    if let Some((head, tail)) = trimmed.rsplit_once([' ', ','])
        && tail.len() == 2
        && tail.chars().all(|c| c.is_ascii_alphabetic())
    {
        let city = head.trim_end_matches([',', ' ']);
        if !city.is_empty() {
            return (city.to_string(), tail.to_uppercase());
        }
    }
    (trimmed.to_string(), String::new())
}

/// Finds the first CSV member whose name contains `prefix`
/// (case-insensitively).
fn find_csv_member<R: Read + Seek>(archive: &zip::ZipArchive<R>, prefix: &str) -> Option<String> {
    let prefix_lower = prefix.to_lowercase();
    archive
        .file_names()
        .find(|name| {
            let lower = name.to_lowercase();
            lower.contains(&prefix_lower) && lower.ends_with(".csv")
        })
        .map(str::to_string)
}

/// Reads a feature attribute that may arrive as a string or a number.
fn attr_string(record: &serde_json::Value, key: &str) -> String {
    match record.get(key) {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn lossy_field(record: &csv::ByteRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .unwrap_or_default()
}

/// King County parcel enrichment fetcher.
#[derive(Debug)]
pub struct KcEnrichmentSource {
    cache_dir: PathBuf,
}

impl KcEnrichmentSource {
    /// Creates the source with the given bulk-download cache directory.
    #[must_use]
    pub const fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    async fn load_parcels(
        &self,
        client: &reqwest::Client,
    ) -> Result<BTreeMap<String, Parcel>, SourceError> {
        let quoted: Vec<String> = WEST_SEATTLE_ZIPS
            .iter()
            .map(|z| format!("'{z}'"))
            .collect();
        let where_clause = format!("ZIP5 IN ({}) AND PROPTYPE='R'", quoted.join(","));

        let features = fetch_all_features(
            client,
            &FeatureServiceConfig {
                query_url: KC_GIS_PARCELS_URL,
                where_clause: &where_clause,
                out_fields: "PIN,ADDR_FULL,ZIP5,APPRLNDVAL,APPR_IMPR",
                order_by: "OBJECTID",
                page_size: KC_GIS_PAGE_SIZE,
                delay_ms: KC_GIS_RATE_LIMIT_MS,
                label: "kc_enrichment parcels",
            },
        )
        .await?;

        let mut parcels = BTreeMap::new();
        for attrs in features {
            let record = serde_json::Value::Object(attrs);
            let pin = attr_string(&record, "PIN");
            if pin.is_empty() {
                continue;
            }
            parcels.insert(
                pin,
                Parcel {
                    address: attr_string(&record, "ADDR_FULL"),
                    zip: attr_string(&record, "ZIP5"),
                    land_val: parse_f64(record.get("APPRLNDVAL")).unwrap_or(0.0),
                    impr_val: parse_f64(record.get("APPR_IMPR")).unwrap_or(0.0),
                },
            );
        }

        Ok(parcels)
    }

    fn load_mailing(
        zip_path: &Path,
        parcels: &BTreeMap<String, Parcel>,
    ) -> Result<BTreeMap<String, Mailing>, SourceError> {
        let mut mailing = BTreeMap::new();

        let file = File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
        let Some(member) = find_csv_member(&archive, "RPAcct") else {
            log::warn!("No RPAcct CSV found in {}", zip_path.display());
            return Ok(mailing);
        };

        let entry = archive.by_name(&member)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(BufReader::new(entry));

        let headers = reader.byte_headers()?.clone();
        let col = |name: &[u8]| headers.iter().position(|h| h == name);
        let (major_idx, minor_idx) = (col(b"Major"), col(b"Minor"));
        let city_state_idx = col(b"CityState");

        for result in reader.byte_records() {
            let record = result?;
            let pin = make_pin(
                &lossy_field(&record, major_idx),
                &lossy_field(&record, minor_idx),
            );
            if !parcels.contains_key(&pin) {
                continue;
            }

            let (city, state) = parse_city_state(&lossy_field(&record, city_state_idx));
            mailing.insert(pin, Mailing { city, state });
        }

        log::info!("kc_enrichment: {} mailing records matched", mailing.len());
        Ok(mailing)
    }

    fn load_sales(
        zip_path: &Path,
        parcels: &BTreeMap<String, Parcel>,
    ) -> Result<BTreeMap<String, Sale>, SourceError> {
        let mut sales: BTreeMap<String, Sale> = BTreeMap::new();
        let mut rows_read: u64 = 0;

        let file = File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
        let Some(member) = find_csv_member(&archive, "RPSale") else {
            log::warn!("No RPSale CSV found in {}", zip_path.display());
            return Ok(sales);
        };

        let entry = archive.by_name(&member)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(BufReader::new(entry));

        let headers = reader.byte_headers()?.clone();
        let col = |name: &[u8]| headers.iter().position(|h| h == name);
        let (major_idx, minor_idx) = (col(b"Major"), col(b"Minor"));
        let (date_idx, price_idx, buyer_idx) =
            (col(b"DocumentDate"), col(b"SalePrice"), col(b"BuyerName"));

        for result in reader.byte_records() {
            let record = result?;
            rows_read += 1;

            let pin = make_pin(
                &lossy_field(&record, major_idx),
                &lossy_field(&record, minor_idx),
            );
            if !parcels.contains_key(&pin) {
                continue;
            }

            // Dates arrive as MM/DD/YYYY; compare parsed dates, not the
            // raw strings (lexicographic order is not chronological).
            let raw_date = lossy_field(&record, date_idx);
            let Some(date_iso) = to_iso_date(&raw_date) else {
                continue;
            };
            let Some(date) = parse_iso_date(&date_iso) else {
                continue;
            };

            if sales.get(&pin).is_some_and(|existing| existing.date >= date) {
                continue;
            }

            sales.insert(
                pin,
                Sale {
                    date,
                    date_iso,
                    price: lossy_field(&record, price_idx).parse().unwrap_or(0.0),
                    buyer: lossy_field(&record, buyer_idx),
                },
            );
        }

        log::info!("kc_enrichment: {rows_read} sale rows scanned, {} matched", sales.len());
        Ok(sales)
    }

    async fn load_foreclosures(
        client: &reqwest::Client,
    ) -> Result<BTreeSet<String>, SourceError> {
        let url = format!("{KC_SODA_BASE}/{KC_FORECLOSURE_DATASET}.json");
        let records: Vec<serde_json::Value> = client
            .get(&url)
            .query(&[("$limit", "5000")])
            .timeout(FORECLOSURE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut pins = BTreeSet::new();
        for record in &records {
            let pin = get_str(record, "parcels").unwrap_or_default().trim();
            if !pin.is_empty() {
                pins.insert(pin.to_string());
            }
        }

        log::info!("kc_enrichment: {} foreclosure PINs loaded", pins.len());
        Ok(pins)
    }

    fn enrich(
        pin: &str,
        parcel: &Parcel,
        mailing: Option<&Mailing>,
        sale: Option<&Sale>,
        in_foreclosure: bool,
    ) -> serde_json::Value {
        json!({
            "pin": pin,
            "address": parcel.address,
            "zip": parcel.zip,
            "land_val": parcel.land_val,
            "impr_val": parcel.impr_val,
            "mailing": mailing.map(|m| json!({"city": m.city, "state": m.state})),
            "sale": sale.map(|s| json!({
                "date": s.date_iso,
                "price": s.price,
                "buyer": s.buyer,
            })),
            "in_foreclosure": in_foreclosure,
        })
    }
}

#[async_trait]
impl DistressSource for KcEnrichmentSource {
    fn source_name(&self) -> &'static str {
        "kc_enrichment"
    }

    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
        let client = reqwest::Client::new();

        let parcels = self.load_parcels(&client).await?;

        let rpacct = ensure_downloaded(&client, KC_RPACCT_URL, &self.cache_dir, "rpacct.zip").await?;
        let mailing = Self::load_mailing(&rpacct, &parcels)?;

        let rpsale = ensure_downloaded(&client, KC_RPSALE_URL, &self.cache_dir, "rpsale.zip").await?;
        let sales = Self::load_sales(&rpsale, &parcels)?;

        let foreclosures = Self::load_foreclosures(&client).await?;

        log::info!(
            "kc_enrichment: {} parcels, {} mailing, {} sales, {} foreclosures",
            parcels.len(),
            mailing.len(),
            sales.len(),
            foreclosures.len()
        );

        let mut total: u64 = 0;
        let mut batch: RecordPage = Vec::with_capacity(BATCH_SIZE);

        for (pin, parcel) in &parcels {
            let record = Self::enrich(
                pin,
                parcel,
                mailing.get(pin),
                sales.get(pin),
                foreclosures.contains(pin),
            );
            if self.extract_signals(&record).is_empty() {
                continue;
            }

            batch.push(record);
            total += 1;

            if batch.len() >= BATCH_SIZE {
                tx.send(std::mem::take(&mut batch)).await?;
            }
        }

        if !batch.is_empty() {
            tx.send(batch).await?;
        }

        log::info!("kc_enrichment: {total} enriched parcels emitted");
        Ok(total)
    }

    fn extract_address(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "address")
            .filter(|a| !a.is_empty())
            .map(str::to_string)
    }

    fn extract_coords(&self, _record: &serde_json::Value) -> (Option<f64>, Option<f64>) {
        (None, None)
    }

    fn extract_zip(&self, record: &serde_json::Value) -> Option<String> {
        get_str(record, "zip").filter(|z| !z.is_empty()).map(str::to_string)
    }

    #[allow(clippy::too_many_lines)]
    fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal> {
        let mut signals = Vec::new();
        let pin = get_str(record, "pin").unwrap_or_default();
        let land_val = parse_f64(record.get("land_val")).unwrap_or(0.0);
        let impr_val = parse_f64(record.get("impr_val")).unwrap_or(0.0);

        // Absentee owner
        if let Some(mailing) = record.get("mailing").filter(|m| !m.is_null()) {
            let state = get_str(mailing, "state").unwrap_or_default();
            let city = get_str(mailing, "city").unwrap_or_default();
            if !state.is_empty() && state != "WA" {
                signals.push(ExtractedSignal {
                    source_record_id: format!("kc-absentee-{pin}"),
                    signal_type: SignalType::AbsenteeOwnerOutOfState,
                    detail: json!({"mailing_city": city, "mailing_state": state}),
                    event_date: None,
                });
            } else if state == "WA" && !city.is_empty() && city.to_uppercase() != "SEATTLE" {
                signals.push(ExtractedSignal {
                    source_record_id: format!("kc-absentee-{pin}"),
                    signal_type: SignalType::AbsenteeOwnerInState,
                    detail: json!({"mailing_city": city, "mailing_state": state}),
                    event_date: None,
                });
            }
        }

        // Ownership duration / recent sale
        let sale = record.get("sale").filter(|s| !s.is_null());
        if let Some(sale) = sale {
            let date_iso = get_str(sale, "date").unwrap_or_default();
            if let Some(date) = parse_iso_date(date_iso) {
                let today = chrono::Utc::now().date_naive();
                let age_years = f64::from(
                    i32::try_from(today.signed_duration_since(date).num_days()).unwrap_or(i32::MAX),
                ) / 365.25;

                // Ownership duration is a present-state observation, so
                // the long-term signals carry no event date; a decades-old
                // sale date would put them outside the scoring window.
                if age_years >= 20.0 {
                    signals.push(ExtractedSignal {
                        source_record_id: format!("kc-longterm-{pin}"),
                        signal_type: SignalType::LongTermOwner20Yr,
                        detail: json!({
                            "last_sale_date": date_iso,
                            "years": (age_years * 10.0).round() / 10.0,
                        }),
                        event_date: None,
                    });
                } else if age_years >= 10.0 {
                    signals.push(ExtractedSignal {
                        source_record_id: format!("kc-longterm-{pin}"),
                        signal_type: SignalType::LongTermOwner10Yr,
                        detail: json!({
                            "last_sale_date": date_iso,
                            "years": (age_years * 10.0).round() / 10.0,
                        }),
                        event_date: None,
                    });
                }

                let price = parse_f64(sale.get("price")).unwrap_or(0.0);
                if age_years < 1.0 && price > 0.0 {
                    signals.push(ExtractedSignal {
                        source_record_id: format!("kc-sold-{pin}"),
                        signal_type: SignalType::RecentlySold,
                        detail: json!({
                            "price": price,
                            "buyer": get_str(sale, "buyer").unwrap_or_default(),
                            "status": "sold",
                        }),
                        event_date: Some(date_iso.to_string()),
                    });
                }
            }
        } else {
            // No sale on record at all: owned since before the records.
            signals.push(ExtractedSignal {
                source_record_id: format!("kc-longterm-{pin}"),
                signal_type: SignalType::LongTermOwner20Yr,
                detail: json!({"last_sale_date": null, "years": null}),
                event_date: None,
            });
        }

        // Foreclosure
        if record
            .get("in_foreclosure")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
        {
            signals.push(ExtractedSignal {
                source_record_id: format!("kc-foreclosure-{pin}"),
                signal_type: SignalType::Foreclosure,
                detail: json!({}),
                event_date: None,
            });
        }

        // Low improvement-to-land ratio
        if land_val > 0.0 && impr_val < land_val * LOW_IMPROVEMENT_RATIO {
            signals.push(ExtractedSignal {
                source_record_id: format!("kc-lowimpr-{pin}"),
                signal_type: SignalType::LowImprovementRatio,
                detail: json!({
                    "land_val": land_val,
                    "impr_val": impr_val,
                    "ratio": ((impr_val / land_val) * 100.0).round() / 100.0,
                }),
                event_date: None,
            });
        }

        signals
    }
}
