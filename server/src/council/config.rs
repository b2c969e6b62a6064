//! Council configuration records and the configuration provider seam.
//!
//! The orchestrator re-reads all four records at the start of every
//! request, so providers may change values between requests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::CouncilError;
use super::types::CouncilMember;

/// Ordered council roster plus quorum settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Members in configured order; member ids must be unique.
    pub members: Vec<CouncilMember>,
    /// Minimum number of active members for consensus.
    #[serde(default = "default_minimum_size")]
    pub minimum_size: usize,
    /// Whether to fail with `InsufficientQuorum` below `minimum_size`.
    #[serde(default)]
    pub require_minimum_for_consensus: bool,
}

const fn default_minimum_size() -> usize {
    1
}

impl CouncilConfig {
    /// Validate roster invariants: unique member ids, `minimum_size`
    /// within bounds, and positive per-member deadlines.
    pub fn validate(&self) -> Result<(), CouncilError> {
        if self.members.is_empty() {
            return Err(CouncilError::Configuration(
                "council has no members".to_string(),
            ));
        }
        if self.minimum_size > self.members.len() {
            return Err(CouncilError::Configuration(format!(
                "minimum_size {} exceeds council size {}",
                self.minimum_size,
                self.members.len()
            )));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if !seen.insert(member.member_id.as_str()) {
                return Err(CouncilError::Configuration(format!(
                    "duplicate member id: {}",
                    member.member_id
                )));
            }
            if member.timeout_seconds <= 0.0 || !member.timeout_seconds.is_finite() {
                return Err(CouncilError::Configuration(format!(
                    "member {} has invalid timeout {}s",
                    member.member_id, member.timeout_seconds
                )));
            }
        }

        Ok(())
    }
}

/// Deliberation presets mapping to a round count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliberationPreset {
    Fast,
    Balanced,
    Thorough,
    ResearchGrade,
}

impl DeliberationPreset {
    /// Round count implied by the preset.
    #[must_use]
    pub const fn rounds(self) -> u32 {
        match self {
            Self::Fast => 0,
            Self::Balanced => 1,
            Self::Thorough => 2,
            Self::ResearchGrade => 4,
        }
    }
}

/// Number of peer-review rounds driven after round 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationConfig {
    /// Rounds beyond the initial answers; 0 skips deliberation.
    pub rounds: u32,
    /// Preset tag the round count was derived from.
    #[serde(default)]
    pub preset: Option<DeliberationPreset>,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self::from_preset(DeliberationPreset::Balanced)
    }
}

impl DeliberationConfig {
    /// Derive the config from a preset tag.
    #[must_use]
    pub const fn from_preset(preset: DeliberationPreset) -> Self {
        Self {
            rounds: preset.rounds(),
            preset: Some(preset),
        }
    }
}

/// Request-level performance knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Global deadline for the whole fan-out, in seconds. Must be > 0.
    pub global_timeout_seconds: f64,
    /// Whether to fall back to partial results aggressively. Transparent
    /// to the orchestration core.
    #[serde(default)]
    pub fast_fallback: bool,
    /// Whether adapters may stream. Transparent to the orchestration core.
    #[serde(default)]
    pub streaming: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            global_timeout_seconds: 60.0,
            fast_fallback: false,
            streaming: false,
        }
    }
}

impl PerformanceConfig {
    /// Validate the global deadline.
    pub fn validate(&self) -> Result<(), CouncilError> {
        if self.global_timeout_seconds <= 0.0 || !self.global_timeout_seconds.is_finite() {
            return Err(CouncilError::Configuration(format!(
                "invalid global timeout {}s",
                self.global_timeout_seconds
            )));
        }
        Ok(())
    }
}

/// Opaque strategy descriptor passed through to the synthesis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Strategy name, recorded on the decision.
    pub strategy: String,
    /// Strategy-specific options, uninterpreted by the core.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            strategy: "similarity".to_string(),
            options: serde_json::Value::Null,
        }
    }
}

/// Supplies the four configuration records consumed per request.
///
/// Implementations must not suspend; configuration reads are synchronous.
pub trait ConfigProvider: Send + Sync {
    fn council_config(&self) -> Result<CouncilConfig, CouncilError>;
    fn deliberation_config(&self) -> Result<DeliberationConfig, CouncilError>;
    fn performance_config(&self) -> Result<PerformanceConfig, CouncilError>;
    fn synthesis_config(&self) -> Result<SynthesisConfig, CouncilError>;
}

/// Fixed in-memory configuration, used by tests and embedded setups.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    pub council: CouncilConfig,
    pub deliberation: DeliberationConfig,
    pub performance: PerformanceConfig,
    pub synthesis: SynthesisConfig,
}

impl StaticConfigProvider {
    /// Build a provider from a roster with default deliberation,
    /// performance, and synthesis settings.
    #[must_use]
    pub fn new(council: CouncilConfig) -> Self {
        Self {
            council,
            deliberation: DeliberationConfig::default(),
            performance: PerformanceConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn council_config(&self) -> Result<CouncilConfig, CouncilError> {
        Ok(self.council.clone())
    }

    fn deliberation_config(&self) -> Result<DeliberationConfig, CouncilError> {
        Ok(self.deliberation.clone())
    }

    fn performance_config(&self) -> Result<PerformanceConfig, CouncilError> {
        Ok(self.performance.clone())
    }

    fn synthesis_config(&self) -> Result<SynthesisConfig, CouncilError> {
        Ok(self.synthesis.clone())
    }
}

/// On-disk council configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigDocument {
    council: Option<CouncilConfig>,
    #[serde(default)]
    deliberation: Option<DeliberationConfig>,
    #[serde(default)]
    performance: Option<PerformanceConfig>,
    #[serde(default)]
    synthesis: Option<SynthesisConfig>,
}

/// JSON-file-backed provider that re-reads the file on every access,
/// so edits take effect on the next request.
///
/// A parse failure keeps serving the last good document and logs a
/// warning; a missing council section is a `ConfigurationError`.
pub struct JsonFileConfigProvider {
    path: PathBuf,
    last_good: Mutex<Option<ConfigDocument>>,
}

impl JsonFileConfigProvider {
    /// Create a provider for the given JSON file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(None),
        }
    }

    fn load(&self) -> Result<ConfigDocument, CouncilError> {
        let read = std::fs::read_to_string(&self.path)
            .map_err(|e| CouncilError::Configuration(format!("read {:?}: {e}", self.path)))
            .and_then(|raw| {
                serde_json::from_str::<ConfigDocument>(&raw)
                    .map_err(|e| CouncilError::Configuration(format!("parse {:?}: {e}", self.path)))
            });

        match read {
            Ok(doc) => {
                *self.last_good.lock().expect("config lock poisoned") = Some(doc.clone());
                Ok(doc)
            }
            Err(e) => {
                let cached = self.last_good.lock().expect("config lock poisoned").clone();
                if let Some(doc) = cached {
                    warn!(error = %e, "Config reload failed, serving last good document");
                    Ok(doc)
                } else {
                    Err(e)
                }
            }
        }
    }
}

impl ConfigProvider for JsonFileConfigProvider {
    fn council_config(&self) -> Result<CouncilConfig, CouncilError> {
        self.load()?.council.ok_or_else(|| {
            CouncilError::Configuration(format!("{:?} has no council section", self.path))
        })
    }

    fn deliberation_config(&self) -> Result<DeliberationConfig, CouncilError> {
        Ok(self.load()?.deliberation.unwrap_or_default())
    }

    fn performance_config(&self) -> Result<PerformanceConfig, CouncilError> {
        Ok(self.load()?.performance.unwrap_or_default())
    }

    fn synthesis_config(&self) -> Result<SynthesisConfig, CouncilError> {
        Ok(self.load()?.synthesis.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str) -> CouncilMember {
        CouncilMember {
            member_id: id.to_string(),
            provider_id: format!("{id}-provider"),
            model: "test-model".to_string(),
            version: None,
            weight: None,
            timeout_seconds: 30.0,
            retry: crate::council::RetryPolicy::default(),
            cost_per_1k_tokens: None,
        }
    }

    #[test]
    fn validate_rejects_duplicate_member_ids() {
        let config = CouncilConfig {
            members: vec![member("m1"), member("m1")],
            minimum_size: 1,
            require_minimum_for_consensus: false,
        };

        assert!(matches!(
            config.validate(),
            Err(CouncilError::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_minimum_above_council_size() {
        let config = CouncilConfig {
            members: vec![member("m1")],
            minimum_size: 2,
            require_minimum_for_consensus: true,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_member_timeout() {
        let mut bad = member("m1");
        bad.timeout_seconds = 0.0;
        let config = CouncilConfig {
            members: vec![bad],
            minimum_size: 1,
            require_minimum_for_consensus: false,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn presets_map_to_round_counts() {
        assert_eq!(DeliberationPreset::Fast.rounds(), 0);
        assert_eq!(DeliberationPreset::Balanced.rounds(), 1);
        assert_eq!(DeliberationPreset::Thorough.rounds(), 2);
        assert_eq!(DeliberationPreset::ResearchGrade.rounds(), 4);
    }

    #[test]
    fn performance_rejects_zero_global_timeout() {
        let config = PerformanceConfig {
            global_timeout_seconds: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
