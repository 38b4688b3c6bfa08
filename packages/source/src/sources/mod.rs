//! One module per distress data source.

pub mod code_violations;
pub mod fire_calls;
pub mod kc_enrichment;
pub mod permits;
pub mod recent_sales;
pub mod urm_buildings;
