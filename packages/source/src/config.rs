//! Shared source configuration: coverage area, endpoints, and pacing.

/// Zip codes covered by the pipeline (West Seattle).
pub const WEST_SEATTLE_ZIPS: &[&str] = &["98106", "98116", "98126", "98136", "98146"];

/// Seattle open-data SODA API base URL.
pub const SODA_BASE: &str = "https://data.seattle.gov/resource";

/// Code Complaints & Violations dataset.
pub const DATASET_CODE_VIOLATIONS: &str = "ez4a-iug7";

/// Building Permits dataset.
pub const DATASET_PERMITS: &str = "76t5-zqzr";

/// Fire 911 Calls dataset.
pub const DATASET_FIRE_911: &str = "kzjm-xkqj";

/// Unreinforced Masonry Buildings dataset.
pub const DATASET_URM: &str = "54qs-2h7f";

/// Records per SODA page.
pub const SODA_PAGE_SIZE: u64 = 1000;

/// Delay between SODA page requests.
pub const SODA_RATE_LIMIT_MS: u64 = 500;

/// Environment variable holding an optional Socrata app token, attached
/// as an `X-App-Token` header for higher rate limits.
pub const SODA_APP_TOKEN_ENV: &str = "SODA_APP_TOKEN";

/// Fire 911 geographic filter: center of West Seattle, 5 km radius.
pub const FIRE_CENTER_LAT: f64 = 47.5615;
/// Fire filter center longitude.
pub const FIRE_CENTER_LNG: f64 = -122.3706;
/// Fire filter radius in meters.
pub const FIRE_RADIUS_METERS: u32 = 5000;

/// King County SODA API base URL.
pub const KC_SODA_BASE: &str = "https://data.kingcounty.gov/resource";

/// King County foreclosure-list dataset.
pub const KC_FORECLOSURE_DATASET: &str = "nx4x-3dfa";

/// King County parcel feature service (layer 2: the parcel spine).
pub const KC_GIS_PARCELS_URL: &str =
    "https://gismaps.kingcounty.gov/arcgis/rest/services/Property/KingCo_PropertyInfo/MapServer/2/query";

/// Records per feature-service page.
pub const KC_GIS_PAGE_SIZE: u64 = 2000;

/// Delay between feature-service page requests.
pub const KC_GIS_RATE_LIMIT_MS: u64 = 300;

/// King County assessor bulk extract: real property accounts (owner
/// mailing addresses).
pub const KC_RPACCT_URL: &str =
    "https://aqua.kingcounty.gov/extranet/assessor/Real%20Property%20Account.zip";

/// King County assessor bulk extract: real property sales.
pub const KC_RPSALE_URL: &str =
    "https://aqua.kingcounty.gov/extranet/assessor/Real%20Property%20Sales.zip";

/// How long a cached bulk download stays fresh.
pub const DOWNLOAD_CACHE_DAYS: u64 = 7;

/// Builds a SODA `in(...)` clause over the covered zip codes.
#[must_use]
pub fn zips_in_clause(field: &str) -> String {
    let quoted: Vec<String> = WEST_SEATTLE_ZIPS
        .iter()
        .map(|z| format!("'{z}'"))
        .collect();
    format!("{field} in({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_zip_whitelist_clause() {
        let clause = zips_in_clause("originalzip");
        assert!(clause.starts_with("originalzip in('98106'"));
        assert!(clause.ends_with("'98146')"));
    }
}
