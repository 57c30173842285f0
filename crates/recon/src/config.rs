use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Tunables for matching, connecting and reconciling.
///
/// Every key is optional; an empty TOML document yields the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum composite score for a match to be accepted.
    pub match_threshold: f64,
    pub weights: ScoreWeights,
    /// Connector: fields below this confidence (0-100) are reported.
    pub low_confidence: f64,
    /// Reconciler: minimum name ratio for two fields to be merged.
    pub reconcile_similarity: f64,
    pub claim_policy: ClaimPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            weights: ScoreWeights::default(),
            low_confidence: 70.0,
            reconcile_similarity: 0.85,
            claim_policy: ClaimPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub name: f64,
    /// Awarded in full when declared types agree, else nothing.
    #[serde(rename = "type")]
    pub type_match: f64,
    pub content: f64,
}

impl ScoreWeights {
    /// Non-negative and summing to 1 within 1e-6.
    pub fn check(&self) -> Result<(), String> {
        if self.name < 0.0 || self.type_match < 0.0 || self.content < 0.0 {
            return Err("weights must be non-negative".into());
        }
        let sum = self.name + self.type_match + self.content;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("weights must sum to 1, got {sum}"));
        }
        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            name: 0.5,
            type_match: 0.3,
            content: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Claim policy
// ---------------------------------------------------------------------------

/// Whether one source field may fill several template fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Every template field independently takes its best source field.
    #[default]
    Shared,
    /// Highest-scoring pairs are assigned first; a source field is used once.
    Exclusive,
}

impl std::fmt::Display for ClaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MatchConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: MatchConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Validation(format!("{name} must be in [0, 1], got {v}")))
            }
        };
        unit("match_threshold", self.match_threshold)?;
        unit("reconcile_similarity", self.reconcile_similarity)?;

        if !(0.0..=100.0).contains(&self.low_confidence) {
            return Err(ConfigError::Validation(format!(
                "low_confidence must be in [0, 100], got {}",
                self.low_confidence
            )));
        }

        self.weights.check().map_err(ConfigError::Validation)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
