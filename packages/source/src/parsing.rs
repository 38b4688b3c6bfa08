//! Shared parsing utilities for raw source records.
//!
//! SODA and feature-service records are weakly typed: the same field may
//! arrive as a JSON string or a number, and dates come in several
//! formats. Parse failures are treated as absence.

use chrono::NaiveDate;

/// Returns a string field from a record object, if present and a string.
#[must_use]
pub fn get_str<'a>(record: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(serde_json::Value::as_str)
}

/// Returns a string field uppercased and trimmed, or an empty string.
#[must_use]
pub fn get_upper(record: &serde_json::Value, key: &str) -> String {
    get_str(record, key).map_or_else(String::new, |s| s.trim().to_uppercase())
}

/// Parses a field that may be a JSON number or a numeric string.
#[must_use]
pub fn parse_f64(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses paired latitude/longitude fields from a record. Returns
/// `(None, None)` unless both parse.
#[must_use]
pub fn parse_coords(
    record: &serde_json::Value,
    lat_key: &str,
    lng_key: &str,
) -> (Option<f64>, Option<f64>) {
    let lat = parse_f64(record.get(lat_key));
    let lng = parse_f64(record.get(lng_key));
    match (lat, lng) {
        (Some(lat), Some(lng)) => (Some(lat), Some(lng)),
        _ => (None, None),
    }
}

/// Parses a source-native date string to an ISO `YYYY-MM-DD` string.
///
/// Accepts `MM/DD/YYYY` (assessor extracts), `YYYY-MM-DD` (already ISO,
/// with or without a time suffix), and `Month-D-YYYY` (sales exports).
#[must_use]
pub fn to_iso_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let head = trimmed.get(..10).unwrap_or(trimmed);
    for format in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(head, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%B-%d-%Y") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    None
}

/// Parses an ISO `YYYY-MM-DD` prefix into a [`NaiveDate`].
#[must_use]
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_number_fields() {
        let record = serde_json::json!({"a": "47.56", "b": 12.5, "c": true});
        assert_eq!(parse_f64(record.get("a")), Some(47.56));
        assert_eq!(parse_f64(record.get("b")), Some(12.5));
        assert_eq!(parse_f64(record.get("c")), None);
        assert_eq!(parse_f64(record.get("missing")), None);
    }

    #[test]
    fn coords_require_both_sides() {
        let record = serde_json::json!({"latitude": "47.5", "longitude": "-122.3"});
        assert_eq!(
            parse_coords(&record, "latitude", "longitude"),
            (Some(47.5), Some(-122.3))
        );

        let partial = serde_json::json!({"latitude": "47.5"});
        assert_eq!(parse_coords(&partial, "latitude", "longitude"), (None, None));

        let garbage = serde_json::json!({"latitude": "n/a", "longitude": "-122.3"});
        assert_eq!(parse_coords(&garbage, "latitude", "longitude"), (None, None));
    }

    #[test]
    fn converts_us_dates_to_iso() {
        assert_eq!(to_iso_date("03/15/2001").as_deref(), Some("2001-03-15"));
        assert_eq!(to_iso_date("2001-03-15").as_deref(), Some("2001-03-15"));
        assert_eq!(
            to_iso_date("2001-03-15T00:00:00.000").as_deref(),
            Some("2001-03-15")
        );
        assert_eq!(to_iso_date("May-19-2023").as_deref(), Some("2023-05-19"));
        assert_eq!(to_iso_date("not a date"), None);
        assert_eq!(to_iso_date(""), None);
    }

    #[test]
    fn parses_iso_prefix() {
        assert_eq!(
            parse_iso_date("2024-06-01T12:00:00"),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(parse_iso_date("garbage"), None);
    }
}
