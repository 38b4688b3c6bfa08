//! Paginated fetcher for `ArcGIS`-style REST feature services.
//!
//! Requests attribute records only (no geometry) and follows the
//! server's `exceededTransferLimit` flag, which is the canonical
//! pagination signal: a short page does not mean the end because the
//! server silently caps results at its own `maxRecordCount`.

use std::time::Duration;

use crate::SourceError;

/// Per-request timeout for feature-service pages.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a feature-service fetch.
pub struct FeatureServiceConfig<'a> {
    /// The layer query URL (ending in `/query`).
    pub query_url: &'a str,
    /// The `where` filter expression.
    pub where_clause: &'a str,
    /// Comma-separated attribute fields to request.
    pub out_fields: &'a str,
    /// Stable ordering field so offsets paginate consistently.
    pub order_by: &'a str,
    /// Records per page.
    pub page_size: u64,
    /// Delay between page requests in milliseconds.
    pub delay_ms: u64,
    /// Label for log messages.
    pub label: &'a str,
}

/// Fetches every matching feature's attribute map.
///
/// # Errors
///
/// Returns [`SourceError`] if an HTTP request fails or a response is not
/// the expected shape.
pub async fn fetch_all_features(
    client: &reqwest::Client,
    config: &FeatureServiceConfig<'_>,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, SourceError> {
    let mut attributes = Vec::new();
    let mut offset: u64 = 0;

    loop {
        let page_size = config.page_size.to_string();
        let offset_param = offset.to_string();
        let response = client
            .get(config.query_url)
            .query(&[
                ("where", config.where_clause),
                ("outFields", config.out_fields),
                ("returnGeometry", "false"),
                ("f", "json"),
                ("resultRecordCount", page_size.as_str()),
                ("resultOffset", offset_param.as_str()),
                ("orderByFields", config.order_by),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;

        let features = body
            .get("features")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let count = features.len() as u64;
        if count == 0 {
            break;
        }

        for feature in features {
            if let Some(serde_json::Value::Object(attrs)) = feature.get("attributes").cloned() {
                attributes.push(attrs);
            }
        }

        offset += count;
        log::info!("{}: {offset} features fetched", config.label);

        let exceeded = body
            .get("exceededTransferLimit")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !exceeded {
            break;
        }

        tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
    }

    log::info!(
        "{}: download complete — {} features",
        config.label,
        attributes.len()
    );
    Ok(attributes)
}
