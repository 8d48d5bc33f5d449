use matcher::MatchError;
use thiserror::Error;

/// Errors that abort a planning run or graph construction.
///
/// "No plan found" is not an error: it is a plan whose layers are empty.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A comparison failed; the whole run is abandoned.
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("invalid planner config: {0}")]
    InvalidConfig(String),
    #[error("planning did not reach a fixpoint within {limit} passes")]
    PassLimitExceeded { limit: usize },
}

impl PlanError {
    /// The matcher failure behind this error, if any.
    pub fn match_error(&self) -> Option<&MatchError> {
        match self {
            PlanError::Match(err) => Some(err),
            _ => None,
        }
    }
}
