use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ACADEMIC_WEIGHT: f64 = 0.4;
pub const DEFAULT_FINANCIAL_WEIGHT: f64 = 0.3;
pub const DEFAULT_EXTRACURRICULAR_WEIGHT: f64 = 0.3;
pub const MATCH_SCORE_FLOOR: f64 = 60.0;
pub const GPA_CEILING: f64 = 10.0;
pub const DEFAULT_GROUP_MIN_SCORE: f64 = 7.0;
pub const DEFAULT_GROUP_MIN_COMMON: usize = 2;
pub const DEFAULT_TOP_MATCHES: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Tunables for scoring, match persistence and grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub default_academic_weight: f64,
    pub default_financial_weight: f64,
    pub default_extracurricular_weight: f64,
    /// Minimum computed score for a match to be persisted.
    pub match_score_floor: f64,
    pub gpa_ceiling: f64,
    pub default_group_min_score: f64,
    pub default_group_min_common: usize,
    pub default_top_matches: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_academic_weight: DEFAULT_ACADEMIC_WEIGHT,
            default_financial_weight: DEFAULT_FINANCIAL_WEIGHT,
            default_extracurricular_weight: DEFAULT_EXTRACURRICULAR_WEIGHT,
            match_score_floor: MATCH_SCORE_FLOOR,
            gpa_ceiling: GPA_CEILING,
            default_group_min_score: DEFAULT_GROUP_MIN_SCORE,
            default_group_min_common: DEFAULT_GROUP_MIN_COMMON,
            default_top_matches: DEFAULT_TOP_MATCHES,
        }
    }
}

impl MatchingConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: MatchingConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("default_academic_weight", self.default_academic_weight),
            ("default_financial_weight", self.default_financial_weight),
            ("default_extracurricular_weight", self.default_extracurricular_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must be a non-negative number, got {value}"),
                });
            }
        }

        if self.gpa_ceiling.is_nan() || self.gpa_ceiling <= 0.0 {
            return Err(ConfigError::Invalid {
                message: format!("gpa_ceiling must be positive, got {}", self.gpa_ceiling),
            });
        }

        if !(0.0..=100.0).contains(&self.match_score_floor) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "match_score_floor must lie in [0, 100], got {}",
                    self.match_score_floor
                ),
            });
        }

        Ok(())
    }
}
