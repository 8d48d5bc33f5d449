use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Truncation applied to ranked discovery output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum number of ranked results returned.
    #[serde(default = "DiscoveryConfig::default_max_results")]
    pub max_results: usize,
    /// Results ranked below this are dropped.
    #[serde(default)]
    pub min_rank_score: f64,
}

impl DiscoveryConfig {
    pub(crate) fn default_max_results() -> usize {
        10
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_min_rank_score(mut self, min_rank_score: f64) -> Self {
        self.min_rank_score = min_rank_score;
        self
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.max_results == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "max_results must be greater than zero".into(),
            ));
        }
        if !self.min_rank_score.is_finite() {
            return Err(DiscoveryError::InvalidConfig(
                "min_rank_score must be a finite number".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_results: Self::default_max_results(),
            min_rank_score: 0.0,
        }
    }
}
