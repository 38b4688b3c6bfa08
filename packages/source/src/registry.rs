//! Source registry.

use std::path::Path;
use std::sync::Arc;

use crate::DistressSource;
use crate::sources::code_violations::CodeViolationsSource;
use crate::sources::fire_calls::FireCallsSource;
use crate::sources::kc_enrichment::KcEnrichmentSource;
use crate::sources::permits::PermitsSource;
use crate::sources::recent_sales::RecentSalesSource;
use crate::sources::urm_buildings::UrmBuildingsSource;

/// Returns all configured data sources, in ingestion order.
///
/// `cache_dir` is where bulk downloads are cached.
#[must_use]
pub fn all_sources(cache_dir: &Path) -> Vec<Arc<dyn DistressSource>> {
    vec![
        Arc::new(CodeViolationsSource::new()),
        Arc::new(PermitsSource::new()),
        Arc::new(FireCallsSource::new()),
        Arc::new(UrmBuildingsSource::new()),
        Arc::new(KcEnrichmentSource::new(cache_dir.to_path_buf())),
        Arc::new(RecentSalesSource::new()),
    ]
}
