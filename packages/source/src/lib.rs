#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Distress-signal data source trait and fetcher implementations.
//!
//! Each municipal data provider implements the [`DistressSource`] trait:
//! it streams pages of raw `serde_json::Value` records through a channel
//! and knows how to pull an address, coordinates, a zip code, and zero or
//! more [`ExtractedSignal`]s out of each record. Records stay weakly typed
//! at this layer; strict types begin at the store.

pub mod config;
pub mod download;
pub mod feature_service;
pub mod parsing;
pub mod registry;
pub mod soda;
pub mod sources;

use async_trait::async_trait;
use distress_map_signal_models::ExtractedSignal;
use tokio::sync::mpsc;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// ZIP archive error.
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The consuming side of the page channel went away.
    #[error("page channel closed")]
    ChannelClosed,
}

impl<T> From<mpsc::error::SendError<T>> for SourceError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

/// A batch of raw records, as one page from a source.
pub type RecordPage = Vec<serde_json::Value>;

/// Trait that all distress data sources implement.
///
/// `fetch_pages` drives the source's own pagination and sends each page
/// through `tx` for immediate processing; the extraction methods are pure
/// functions over a single raw record.
#[async_trait]
pub trait DistressSource: Send + Sync + std::fmt::Debug {
    /// Unique source name, persisted on every signal (e.g. `"permits"`).
    fn source_name(&self) -> &'static str;

    /// Fetches every page of records, sending each through the channel.
    /// Returns the total number of records fetched.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if an HTTP request, download, or parse
    /// fails. Page-level failures propagate; the orchestrator isolates
    /// them at the source boundary.
    async fn fetch_pages(&self, tx: &mpsc::Sender<RecordPage>) -> Result<u64, SourceError>;

    /// Pulls the raw street address out of a record, if present.
    fn extract_address(&self, record: &serde_json::Value) -> Option<String>;

    /// Pulls `(latitude, longitude)` out of a record. Either side may be
    /// absent; parse failures count as absent.
    fn extract_coords(&self, record: &serde_json::Value) -> (Option<f64>, Option<f64>);

    /// Pulls the zip code out of a record, if present.
    fn extract_zip(&self, record: &serde_json::Value) -> Option<String>;

    /// Produces the distress signals this record implies. May be empty.
    fn extract_signals(&self, record: &serde_json::Value) -> Vec<ExtractedSignal>;
}
