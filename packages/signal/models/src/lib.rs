#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Distress-signal taxonomy types shared across the pipeline.
//!
//! This crate defines the closed set of signal types a fetcher may emit,
//! the property tier buckets, and the [`ExtractedSignal`] shape that every
//! source produces per raw record. Keeping the taxonomy in one enum (rather
//! than free-form strings chosen per fetcher) lets the scoring config be
//! validated for full coverage at load time.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One kind of distress observation about a property.
///
/// The string form (snake_case) is what gets persisted in the `signals`
/// table and used as the key in the scoring config's `signal_weights` map.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalType {
    // ── Code complaints & violations ─────────────────────
    /// Building declared unfit for habitation
    UnfitBuilding,
    /// Building reported vacant
    VacantBuilding,
    /// Formal notice of violation issued
    NoticeOfViolation,
    /// Citation issued
    Citation,
    /// Construction-related complaint
    ComplaintConstruction,
    /// Landlord/tenant complaint
    ComplaintLandlordTenant,
    /// Any other code complaint
    ComplaintOther,

    // ── Building permits ─────────────────────────────────
    /// Permit describes demolition work
    Demolished,
    /// Expired permit with estimated cost above the major threshold
    ExpiredPermitMajor,
    /// Expired permit below the major threshold
    ExpiredPermitMinor,
    /// Permit was cancelled
    PermitCancelled,

    // ── Fire response calls ──────────────────────────────
    /// Fire at a residential structure
    ResidentialFire,
    /// Fire at a non-residential building
    BuildingFire,

    // ── Unreinforced masonry inventory ───────────────────
    /// URM building with a completed retrofit
    UrmRetrofitted,
    /// High-risk URM building with no retrofit
    UrmHighRiskNoRetrofit,
    /// URM building with no retrofit
    UrmNoRetrofit,

    // ── Parcel enrichment ────────────────────────────────
    /// Owner mailing address outside the state
    AbsenteeOwnerOutOfState,
    /// Owner mailing address in-state but outside the city
    AbsenteeOwnerInState,
    /// Last recorded sale 20+ years ago (or no sale on record)
    #[serde(rename = "long_term_owner_20yr")]
    #[strum(serialize = "long_term_owner_20yr")]
    LongTermOwner20Yr,
    /// Last recorded sale 10-20 years ago
    #[serde(rename = "long_term_owner_10yr")]
    #[strum(serialize = "long_term_owner_10yr")]
    LongTermOwner10Yr,
    /// Sold within the last year (negative signal)
    RecentlySold,
    /// Parcel appears on the foreclosure list
    Foreclosure,
    /// Improvement appraisal far below land appraisal
    LowImprovementRatio,
}

impl SignalType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::UnfitBuilding,
            Self::VacantBuilding,
            Self::NoticeOfViolation,
            Self::Citation,
            Self::ComplaintConstruction,
            Self::ComplaintLandlordTenant,
            Self::ComplaintOther,
            Self::Demolished,
            Self::ExpiredPermitMajor,
            Self::ExpiredPermitMinor,
            Self::PermitCancelled,
            Self::ResidentialFire,
            Self::BuildingFire,
            Self::UrmRetrofitted,
            Self::UrmHighRiskNoRetrofit,
            Self::UrmNoRetrofit,
            Self::AbsenteeOwnerOutOfState,
            Self::AbsenteeOwnerInState,
            Self::LongTermOwner20Yr,
            Self::LongTermOwner10Yr,
            Self::RecentlySold,
            Self::Foreclosure,
            Self::LowImprovementRatio,
        ]
    }
}

/// Qualitative property bucket assigned by score thresholds.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Tier {
    /// Highest-scoring bucket
    A,
    /// Middle bucket
    B,
    /// Everything below the B cutoff
    #[default]
    C,
}

/// One signal emitted by a fetcher for a single raw record.
///
/// `source_record_id` is the source's natural key when it has one,
/// otherwise a stable synthesis (e.g. address-derived) so re-ingestion
/// stays idempotent. `event_date` is ISO-8601 when present; fetchers
/// convert source-native date formats before emitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSignal {
    /// Unique-per-source record identifier.
    pub source_record_id: String,
    /// Which kind of distress observation this is.
    pub signal_type: SignalType,
    /// Free-form per-record payload, persisted as JSON.
    pub detail: serde_json::Value,
    /// ISO-8601 date of the underlying event, if the source provides one.
    pub event_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_type_string_roundtrip() {
        for signal_type in SignalType::all() {
            let s = signal_type.to_string();
            let parsed: SignalType = s.parse().unwrap();
            assert_eq!(parsed, *signal_type, "roundtrip failed for {s}");
        }
    }

    #[test]
    fn long_term_owner_names_keep_year_separator() {
        assert_eq!(
            SignalType::LongTermOwner20Yr.as_ref(),
            "long_term_owner_20yr"
        );
        assert_eq!(
            SignalType::LongTermOwner10Yr.as_ref(),
            "long_term_owner_10yr"
        );
    }

    #[test]
    fn all_variants_are_unique() {
        let mut names: Vec<&str> = SignalType::all().iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SignalType::all().len());
    }

    #[test]
    fn tier_default_is_c() {
        assert_eq!(Tier::default(), Tier::C);
        assert_eq!("A".parse::<Tier>().unwrap(), Tier::A);
    }
}
