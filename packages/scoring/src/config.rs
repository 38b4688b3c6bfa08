//! Declarative scoring configuration.
//!
//! Loaded from a TOML file (`config/scoring.toml`). Loading validates
//! that `signal_weights` covers every known signal type, so a taxonomy
//! addition cannot silently score at the fallback weight.

use std::collections::BTreeMap;
use std::path::Path;

use distress_map_signal_models::SignalType;
use serde::{Deserialize, Serialize};

use crate::ScoringError;

/// Recency window and decay parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recency {
    /// Signals with an event date older than this many days are skipped.
    pub max_age_days: u32,
    /// Extra weight multiplier at age zero, ramping linearly down to
    /// nothing at the age cutoff.
    pub decay_boost: f64,
}

impl Default for Recency {
    fn default() -> Self {
        Self {
            max_age_days: 1825,
            decay_boost: 0.5,
        }
    }
}

/// Bonus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bonuses {
    /// Distinct contributing sources needed to trigger the bonus.
    pub multi_source_threshold: usize,
    /// Points added when the threshold is met.
    pub multi_source_points: f64,
}

impl Default for Bonuses {
    fn default() -> Self {
        Self {
            multi_source_threshold: 2,
            multi_source_points: 5.0,
        }
    }
}

/// Tier score cutoffs. Tier C is everything below `b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCutoffs {
    /// Minimum total score for tier A.
    #[serde(rename = "A")]
    pub a: f64,
    /// Minimum total score for tier B.
    #[serde(rename = "B")]
    pub b: f64,
}

impl Default for TierCutoffs {
    fn default() -> Self {
        Self { a: 25.0, b: 12.0 }
    }
}

/// The full scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Base weight per signal type; negative values pull scores down.
    pub signal_weights: BTreeMap<String, f64>,
    /// Recency window and decay.
    #[serde(default)]
    pub recency: Recency,
    /// Per-source status multipliers, matched case-insensitively against
    /// the signal's `detail.status`.
    #[serde(default)]
    pub status_multipliers: BTreeMap<String, BTreeMap<String, f64>>,
    /// Bonus parameters.
    #[serde(default)]
    pub bonuses: Bonuses,
    /// Tier cutoffs.
    #[serde(default)]
    pub tiers: TierCutoffs,
}

const fn default_weight(signal_type: SignalType) -> f64 {
    match signal_type {
        SignalType::UnfitBuilding | SignalType::Foreclosure => 12.0,
        SignalType::VacantBuilding => 10.0,
        SignalType::NoticeOfViolation | SignalType::UrmHighRiskNoRetrofit => 6.0,
        SignalType::Citation | SignalType::BuildingFire => 7.0,
        SignalType::ComplaintConstruction
        | SignalType::ExpiredPermitMinor
        | SignalType::AbsenteeOwnerInState
        | SignalType::LongTermOwner10Yr => 2.0,
        SignalType::ComplaintLandlordTenant | SignalType::PermitCancelled => 3.0,
        SignalType::ComplaintOther | SignalType::UrmRetrofitted => 1.0,
        SignalType::Demolished => 8.0,
        SignalType::ExpiredPermitMajor | SignalType::AbsenteeOwnerOutOfState => 5.0,
        SignalType::ResidentialFire => 9.0,
        SignalType::UrmNoRetrofit | SignalType::LongTermOwner20Yr => 4.0,
        SignalType::RecentlySold => -8.0,
        SignalType::LowImprovementRatio => 3.0,
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let signal_weights = SignalType::all()
            .iter()
            .map(|t| (t.to_string(), default_weight(*t)))
            .collect();

        let mut code_violations = BTreeMap::new();
        code_violations.insert("closed".to_string(), 0.4);
        code_violations.insert("resolved".to_string(), 0.4);
        code_violations.insert("complete".to_string(), 0.5);

        let mut permits = BTreeMap::new();
        permits.insert("completed".to_string(), 0.5);

        let mut status_multipliers = BTreeMap::new();
        status_multipliers.insert("code_violations".to_string(), code_violations);
        status_multipliers.insert("permits".to_string(), permits);

        Self {
            signal_weights,
            recency: Recency::default(),
            status_multipliers,
            bonuses: Bonuses::default(),
            tiers: TierCutoffs::default(),
        }
    }
}

impl ScoringConfig {
    /// Loads and validates a config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError`] if the file cannot be read or parsed, or
    /// if `signal_weights` does not cover every signal type.
    pub fn load(path: &Path) -> Result<Self, ScoringError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Lowercases and trims status-multiplier keys so lookups can use a
    /// canonicalized status string.
    fn normalize(&mut self) {
        let normalized = self
            .status_multipliers
            .iter()
            .map(|(source, statuses)| {
                let statuses = statuses
                    .iter()
                    .map(|(status, mult)| (status.trim().to_lowercase(), *mult))
                    .collect();
                (source.clone(), statuses)
            })
            .collect();
        self.status_multipliers = normalized;
    }

    /// Checks that every known signal type has a configured weight.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::MissingWeights`] listing uncovered types.
    pub fn validate(&self) -> Result<(), ScoringError> {
        let missing: Vec<String> = SignalType::all()
            .iter()
            .map(ToString::to_string)
            .filter(|name| !self.signal_weights.contains_key(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScoringError::MissingWeights { missing })
        }
    }

    /// Base weight for a persisted signal-type string. Unknown types
    /// (e.g. rows written by a newer taxonomy) fall back to 1.0.
    #[must_use]
    pub fn weight(&self, signal_type: &str) -> f64 {
        self.signal_weights.get(signal_type).copied().unwrap_or(1.0)
    }

    /// Status multiplier for a signal, given its source and the raw
    /// `detail.status` value. Defaults to 1.0.
    #[must_use]
    pub fn status_multiplier(&self, source: &str, status: Option<&str>) -> f64 {
        let Some(status) = status else {
            return 1.0;
        };
        let key = status.trim().to_lowercase();
        self.status_multipliers
            .get(source)
            .and_then(|statuses| statuses.get(&key))
            .copied()
            .unwrap_or(1.0)
    }
}
