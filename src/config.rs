//! YAML configuration for the capmatch engine.
//!
//! One file configures the matcher executor, the planner and discovery
//! ranking. Every section is optional and falls back to its defaults.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "dealer network"
//!
//! matcher:
//!   default: "hierarchy"
//!   parallel: false
//!   workers: 4
//!   call_timeout_ms: null
//!
//! planner:
//!   one_operation_per_service: true
//!   assignment: "greedy"
//!   max_passes: null
//!
//! discovery:
//!   max_results: 10
//!   min_rank_score: 0.0
//! ```

use std::fs;
use std::path::Path;

use composition::{AssignmentStrategy, PlannerConfig};
use discovery::DiscoveryConfig;
use matcher::{ExecutorConfig, HierarchyMatcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration for the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub matcher: MatcherYamlConfig,

    #[serde(default)]
    pub planner: PlannerYamlConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl EngineConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.matcher.validate()?;
        self.planner_config()
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("planner: {e}")))?;
        self.discovery
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("discovery: {e}")))?;
        Ok(())
    }

    /// Planner settings combined with the matcher's executor settings.
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            one_operation_per_service: self.planner.one_operation_per_service,
            assignment: self.planner.assignment,
            max_passes: self.planner.max_passes,
            executor: self.matcher.executor_config(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            matcher: MatcherYamlConfig::default(),
            planner: PlannerYamlConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// Matcher selection and executor YAML configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherYamlConfig {
    /// Registry name of the matcher used by the engine.
    #[serde(default = "default_matcher")]
    pub default: String,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl MatcherYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.default.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "matcher.default must name a registered matcher".to_string(),
            ));
        }
        self.executor_config()
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("matcher: {e}")))
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            parallel: self.parallel,
            workers: self.workers,
            call_timeout_ms: self.call_timeout_ms,
        }
    }
}

impl Default for MatcherYamlConfig {
    fn default() -> Self {
        Self {
            default: default_matcher(),
            parallel: false,
            workers: default_workers(),
            call_timeout_ms: None,
        }
    }
}

/// Planner YAML configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerYamlConfig {
    #[serde(default = "true_value")]
    pub one_operation_per_service: bool,

    #[serde(default)]
    pub assignment: AssignmentStrategy,

    #[serde(default)]
    pub max_passes: Option<usize>,
}

impl Default for PlannerYamlConfig {
    fn default() -> Self {
        Self {
            one_operation_per_service: true,
            assignment: AssignmentStrategy::default(),
            max_passes: None,
        }
    }
}

// Helper functions for serde defaults
fn default_matcher() -> String {
    HierarchyMatcher::NAME.to_string()
}
fn default_workers() -> usize {
    4
}
fn true_value() -> bool {
    true
}
