#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion orchestrator: drives each source's page stream through the
//! normalizer into the store, audits normalization quality, rescores
//! every property, and keeps run bookkeeping.
//!
//! Sources run sequentially; within a source, fetching and storing
//! overlap through a bounded page channel. Each page commits as one
//! transaction, so interrupting a run leaves a consistent store and
//! re-running upserts the remainder without duplicates.

use std::sync::Arc;

use distress_map_database::{DbError, paths, queries, store};
use distress_map_normalize::normalize_address;
use distress_map_scoring::{ScoringConfig, ScoringError, rescore_all};
use distress_map_source::{DistressSource, RecordPage, SourceError, registry};
use rusqlite::Connection;
use tokio::sync::mpsc;

/// Buffered pages between a fetcher and the store loop.
const PAGE_CHANNEL_DEPTH: usize = 4;

/// How many top-scoring properties the end-of-run summary lists.
const SUMMARY_TOP_N: u32 = 10;

/// Errors that can occur while orchestrating a run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A store operation failed.
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Opening a page transaction failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A fetcher failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The fetch task panicked or was cancelled.
    #[error("Fetch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Scoring config load or rescore failed.
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// `--source` named something that is not registered.
    #[error("Unknown source: {name}")]
    UnknownSource {
        /// The unrecognized name.
        name: String,
    },
}

/// Pipeline invocation arguments.
#[derive(Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Source names to run. Empty means all registered sources.
    pub sources: Vec<String>,
    /// Skip fetching entirely and only re-apply scoring.
    pub rescore_only: bool,
}

/// Per-source ingestion totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceStats {
    /// Records fetched from the source.
    pub fetched: u64,
    /// Property upserts performed (not distinct properties).
    pub properties_touched: u64,
    /// Signals newly inserted.
    pub signals_inserted: u64,
    /// Records skipped for missing or unnormalizable addresses.
    pub skipped: u64,
}

/// Runs the pipeline: selected sources, rescore, run bookkeeping, and a
/// printed summary.
///
/// Individual source failures are logged and do not abort the run; only
/// store/config failures propagate.
///
/// # Errors
///
/// Returns [`IngestError`] on store, config, or rescore failure.
pub async fn run_pipeline(
    conn: &mut Connection,
    args: &PipelineArgs,
) -> Result<(), IngestError> {
    let config = ScoringConfig::load(&paths::scoring_config_path())?;

    if args.rescore_only {
        log::info!("Rescoring all properties from config");
        rescore_all(conn, &config, chrono::Utc::now())?;
        print_summary(conn)?;
        return Ok(());
    }

    let sources = select_sources(&args.sources)?;
    let names: Vec<String> = sources
        .iter()
        .map(|s| s.source_name().to_string())
        .collect();

    let run_id = store::start_run(conn, &names)?;
    log::info!("Pipeline run #{run_id}: {}", names.join(", "));

    let mut total_properties: u64 = 0;
    let mut total_signals: u64 = 0;

    for source in &sources {
        match run_source(conn, source).await {
            Ok(stats) => {
                total_properties += stats.properties_touched;
                total_signals += stats.signals_inserted;
                log::info!(
                    "{}: {} fetched, {} properties touched, {} new signals, {} skipped",
                    source.source_name(),
                    stats.fetched,
                    stats.properties_touched,
                    stats.signals_inserted,
                    stats.skipped
                );
            }
            Err(e) => {
                log::error!("{}: source failed: {e}", source.source_name());
            }
        }
    }

    log::info!("Rescoring all properties");
    rescore_all(conn, &config, chrono::Utc::now())?;

    store::complete_run(conn, run_id, total_properties, total_signals)?;
    print_summary(conn)?;

    Ok(())
}

fn select_sources(requested: &[String]) -> Result<Vec<Arc<dyn DistressSource>>, IngestError> {
    let all = registry::all_sources(&paths::downloads_dir());
    if requested.is_empty() {
        return Ok(all);
    }

    let mut selected = Vec::new();
    for name in requested {
        let source = all
            .iter()
            .find(|s| s.source_name() == name)
            .ok_or_else(|| IngestError::UnknownSource { name: name.clone() })?;
        selected.push(Arc::clone(source));
    }
    Ok(selected)
}

/// Ingests one source: streams its pages, upserting properties and
/// signals with one transaction per page, then runs the
/// normalization-audit pass.
///
/// # Errors
///
/// Returns [`IngestError`] if the fetcher or a store operation fails.
pub async fn run_source(
    conn: &mut Connection,
    source: &Arc<dyn DistressSource>,
) -> Result<SourceStats, IngestError> {
    let name = source.source_name();
    log::info!("{name}: fetching");

    let (tx, mut rx) = mpsc::channel::<RecordPage>(PAGE_CHANNEL_DEPTH);
    let fetcher = Arc::clone(source);
    let fetch_task = tokio::spawn(async move { fetcher.fetch_pages(&tx).await });

    let mut stats = SourceStats::default();
    let mut page_number = 0u32;

    while let Some(page) = rx.recv().await {
        page_number += 1;
        log::info!("{name}: page {page_number}, {} records", page.len());

        let page_tx = conn.transaction()?;
        for record in &page {
            let Some(raw_address) = source.extract_address(record) else {
                stats.skipped += 1;
                continue;
            };
            let Some(norm_address) = normalize_address(&raw_address) else {
                stats.skipped += 1;
                continue;
            };

            let (latitude, longitude) = source.extract_coords(record);
            let zip_code = source.extract_zip(record);

            let property_id = store::upsert_property(
                &page_tx,
                &raw_address,
                &norm_address,
                zip_code.as_deref(),
                latitude,
                longitude,
                None,
            )?;
            stats.properties_touched += 1;

            for signal in source.extract_signals(record) {
                // Weight 0 at rest: real weights live in the scoring
                // config, not storage.
                let inserted = store::upsert_signal(
                    &page_tx,
                    property_id,
                    name,
                    &signal.source_record_id,
                    signal.signal_type,
                    0.0,
                    Some(&signal.detail),
                    signal.event_date.as_deref(),
                )?;
                if inserted {
                    stats.signals_inserted += 1;
                }
            }
        }
        page_tx.commit()?;
    }

    stats.fetched = fetch_task.await??;

    let issues = audit_normalization(conn, name)?;
    if issues > 0 {
        log::warn!("{name}: {issues} potential normalization issues");
    }
    if stats.skipped > 0 {
        log::info!("{name}: skipped {} records (no usable address)", stats.skipped);
    }

    Ok(stats)
}

/// Post-source audit: for every property this source touched that has
/// coordinates, look for a different property within the proximity
/// threshold and record a normalization issue if one exists. These rows
/// are diagnostics for address-normalization gaps; scoring never reads
/// them.
///
/// # Errors
///
/// Returns [`IngestError`] if a store operation fails.
pub fn audit_normalization(conn: &Connection, source_name: &str) -> Result<u64, IngestError> {
    let properties = queries::properties_with_signals_from(conn, source_name)?;
    let mut issues: u64 = 0;

    for property in properties {
        let nearby = store::find_nearby_property(
            conn,
            property.latitude,
            property.longitude,
            store::PROXIMITY_DEGREES,
            Some(property.id),
        )?;

        if let Some(nearby) = nearby {
            store::log_normalization_issue(
                conn,
                property.address_raw.as_deref(),
                &property.address_norm,
                source_name,
                property.latitude,
                property.longitude,
                nearby.id,
                nearby.distance_degrees * store::METERS_PER_DEGREE,
            )?;
            issues += 1;
        }
    }

    Ok(issues)
}

/// Prints the end-of-run summary to stdout.
///
/// # Errors
///
/// Returns [`IngestError`] if a query fails.
pub fn print_summary(conn: &Connection) -> Result<(), IngestError> {
    let properties = queries::property_count(conn)?;
    let signals = queries::signal_count(conn)?;
    let issues = queries::issue_count(conn)?;
    let tiers = queries::tier_counts(conn)?;
    let top = queries::top_properties(conn, SUMMARY_TOP_N)?;

    println!();
    println!("{}", "=".repeat(50));
    println!("Pipeline Summary");
    println!("{}", "=".repeat(50));
    println!("Total properties: {properties}");
    println!("Total signals:    {signals}");
    for tier in &tiers {
        println!("  Tier {}: {}", tier.tier, tier.count);
    }
    if issues > 0 {
        println!("Normalization issues: {issues}");
    }

    if !top.is_empty() {
        println!();
        println!("Top {SUMMARY_TOP_N} properties:");
        for (i, property) in top.iter().enumerate() {
            println!(
                "  {}. [{}] {:.1} - {}",
                i + 1,
                property.tier,
                property.total_score,
                property.address_raw.as_deref().unwrap_or(&property.address_norm)
            );
        }
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use distress_map_database::db::open_in_memory;
    use distress_map_signal_models::{ExtractedSignal, SignalType};
    use serde_json::json;

    use super::*;

    /// A source that serves canned pages, for orchestrator tests.
    #[derive(Debug)]
    struct StaticSource {
        pages: Vec<RecordPage>,
    }

    #[async_trait]
    impl DistressSource for StaticSource {
        fn source_name(&self) -> &'static str {
            "static_test"
        }

        async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError> {
            let mut total = 0;
            for page in &self.pages {
                total += page.len() as u64;
                tx.send(page.clone()).await?;
            }
            Ok(total)
        }

        fn extract_address(&self, record: &serde_json::Value) -> Option<String> {
            record
                .get("address")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        }

        fn extract_coords(&self, record: &serde_json::Value) -> (Option<f64>, Option<f64>) {
            (
                record.get("lat").and_then(serde_json::Value::as_f64),
                record.get("lng").and_then(serde_json::Value::as_f64),
            )
        }

        fn extract_zip(&self, record: &serde_json::Value) -> Option<String> {
            record
                .get("zip")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        }

        fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal> {
            let id = record
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            vec![ExtractedSignal {
                source_record_id: id.to_string(),
                signal_type: SignalType::VacantBuilding,
                detail: json!({}),
                event_date: None,
            }]
        }
    }

    fn sample_source() -> Arc<dyn DistressSource> {
        Arc::new(StaticSource {
            pages: vec![
                vec![
                    json!({"id": "r1", "address": "5812 S.W. Spokane Street", "zip": "98106",
                           "lat": 47.5661, "lng": -122.3668}),
                    json!({"id": "r2", "address": "", "zip": "98106"}),
                ],
                vec![
                    json!({"id": "r3", "address": "5812 SW Spokane St", "zip": "98106"}),
                    json!({"id": "r4"}),
                ],
            ],
        })
    }

    #[tokio::test]
    async fn ingests_pages_and_counts_skips() {
        let mut conn = open_in_memory().unwrap();
        let source = sample_source();

        let stats = run_source(&mut conn, &source).await.unwrap();

        assert_eq!(stats.fetched, 4);
        // r2 has an empty address, r4 none at all.
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.properties_touched, 2);
        assert_eq!(stats.signals_inserted, 2);

        // Both raw spellings normalize to the same canonical address.
        assert_eq!(queries::property_count(&conn).unwrap(), 1);
    }

    #[tokio::test]
    async fn reingesting_is_idempotent() {
        let mut conn = open_in_memory().unwrap();
        let source = sample_source();

        run_source(&mut conn, &source).await.unwrap();
        let again = run_source(&mut conn, &source).await.unwrap();

        assert_eq!(again.signals_inserted, 0);
        assert_eq!(queries::property_count(&conn).unwrap(), 1);
        assert_eq!(queries::signal_count(&conn).unwrap(), 2);
    }

    #[tokio::test]
    async fn audit_flags_near_duplicate_properties() {
        let mut conn = open_in_memory().unwrap();

        // Two spellings that normalize differently but sit a few meters
        // apart.
        let source: Arc<dyn DistressSource> = Arc::new(StaticSource {
            pages: vec![vec![
                json!({"id": "a1", "address": "9030 30th Ave SW",
                       "lat": 47.5225, "lng": -122.3710}),
                json!({"id": "a2", "address": "9030 Thirtieth Avenue SW",
                       "lat": 47.522_55, "lng": -122.371_02}),
            ]],
        });

        run_source(&mut conn, &source).await.unwrap();

        assert_eq!(queries::property_count(&conn).unwrap(), 2);
        assert!(queries::issue_count(&conn).unwrap() >= 1);
    }

    #[test]
    fn unknown_source_name_is_rejected() {
        let err = select_sources(&["nonsense".to_string()]).unwrap_err();
        assert!(matches!(err, IngestError::UnknownSource { .. }));
    }
}
