//! Shared Socrata SODA API paginator.
//!
//! Fetches from any SODA dataset using the `$where`, `$limit`, `$offset`,
//! and `$order` query parameters. Pages of raw JSON records are sent
//! through a channel for immediate processing.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{SODA_APP_TOKEN_ENV, SODA_BASE, SODA_PAGE_SIZE, SODA_RATE_LIMIT_MS};
use crate::{RecordPage, SourceError};

/// Per-request timeout for SODA page fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a SODA fetch operation.
pub struct SodaConfig<'a> {
    /// Dataset identifier (e.g. `"ez4a-iug7"`).
    pub dataset_id: &'a str,
    /// The `$where` filter expression.
    pub where_clause: String,
    /// Label for log messages.
    pub label: &'a str,
}

/// Builds a [`reqwest::Client`], attaching the `X-App-Token` header when
/// the app-token environment variable is set.
///
/// # Errors
///
/// Returns [`SourceError`] if the client cannot be constructed.
pub fn build_client() -> Result<reqwest::Client, SourceError> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Ok(token) = std::env::var(SODA_APP_TOKEN_ENV)
        && let Ok(value) = reqwest::header::HeaderValue::from_str(&token)
    {
        headers.insert("X-App-Token", value);
    }
    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

/// Fetches records from a SODA dataset page by page, sending each page
/// through the provided channel. Stops when a page comes back shorter
/// than the page size.
///
/// Returns the total number of records fetched.
///
/// # Errors
///
/// Returns [`SourceError`] if an HTTP request fails or the channel
/// closes.
pub async fn fetch_soda_pages(
    config: &SodaConfig<'_>,
    tx: &mpsc::Sender<RecordPage>,
) -> Result<u64, SourceError> {
    let client = build_client()?;
    let endpoint = format!("{SODA_BASE}/{}.json", config.dataset_id);
    let mut offset: u64 = 0;

    loop {
        log::info!("{}: offset={offset}", config.label);

        let limit = SODA_PAGE_SIZE.to_string();
        let offset_param = offset.to_string();
        let response = client
            .get(&endpoint)
            .query(&[
                ("$where", config.where_clause.as_str()),
                ("$limit", limit.as_str()),
                ("$offset", offset_param.as_str()),
                ("$order", ":id"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let records: RecordPage = response.json().await?;
        let count = records.len() as u64;
        if count == 0 {
            break;
        }

        offset += count;
        tx.send(records).await?;

        if count < SODA_PAGE_SIZE {
            break;
        }

        tokio::time::sleep(Duration::from_millis(SODA_RATE_LIMIT_MS)).await;
    }

    log::info!("{}: download complete — {offset} records", config.label);
    Ok(offset)
}
