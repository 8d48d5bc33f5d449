//! Planner configuration.

use matcher::ExecutorConfig;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// How required inputs are paired with available concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    /// Each required input, in order, takes the first free compatible
    /// concept. One linear pass, no backtracking; may reject operations an
    /// exhaustive search would accept.
    #[default]
    Greedy,
    /// Maximum bipartite matching (Hopcroft–Karp).
    Exact,
}

fn default_one_operation_per_service() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Select at most one operation per service in each pass.
    #[serde(default = "default_one_operation_per_service")]
    pub one_operation_per_service: bool,
    #[serde(default)]
    pub assignment: AssignmentStrategy,
    /// Abort with `PassLimitExceeded` after this many passes.
    #[serde(default)]
    pub max_passes: Option<usize>,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            one_operation_per_service: default_one_operation_per_service(),
            assignment: AssignmentStrategy::default(),
            max_passes: None,
            executor: ExecutorConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_one_operation_per_service(mut self, enabled: bool) -> Self {
        self.one_operation_per_service = enabled;
        self
    }

    pub fn with_assignment(mut self, assignment: AssignmentStrategy) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn with_max_passes(mut self, limit: usize) -> Self {
        self.max_passes = Some(limit);
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.max_passes == Some(0) {
            return Err(PlanError::InvalidConfig(
                "max_passes must be greater than zero".into(),
            ));
        }
        self.executor
            .validate()
            .map_err(|e| PlanError::InvalidConfig(e.to_string()))
    }
}
