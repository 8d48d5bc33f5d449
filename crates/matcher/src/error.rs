//! Error types produced by the matching layer.
//!
//! | Error | Category | Description |
//! |-------|----------|-------------|
//! | [`MatcherUnavailable`](MatchError::MatcherUnavailable) | Remote | The comparison backend failed; fatal to the current run |
//! | [`UnknownMatcher`](MatchError::UnknownMatcher) | Configuration | Registry lookup miss |
//! | [`UndeclaredMatchType`](MatchError::UndeclaredMatchType) | Contract | A matcher returned a verdict outside its declared lattice |
//! | [`Timeout`](MatchError::Timeout) | Remote | A comparison exceeded its per-call budget |
//! | [`Cancelled`](MatchError::Cancelled) | Run control | The run was cancelled and partial results were discarded |
//! | [`InvalidConcept`](MatchError::InvalidConcept) | Validation | Empty or malformed concept identifier |
//! | [`InvalidConfig`](MatchError::InvalidConfig) | Validation | Executor or registry configuration rejected |
//!
//! Empty result sets are never errors.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by matchers, the executor and the registry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    /// The comparison backend could not answer.
    #[error("matcher `{matcher}` unavailable: {reason}")]
    MatcherUnavailable { matcher: String, reason: String },
    /// No matcher is registered under the requested name.
    #[error("unknown matcher: {0}")]
    UnknownMatcher(String),
    /// The matcher produced a verdict that is not part of its own `MatchTypes`.
    #[error("matcher `{matcher}` returned undeclared match type `{verdict}`")]
    UndeclaredMatchType { matcher: String, verdict: String },
    /// A single comparison exceeded its budget.
    #[error("matcher `{matcher}` took {elapsed:?}, budget was {budget:?}")]
    Timeout {
        matcher: String,
        elapsed: Duration,
        budget: Duration,
    },
    /// The run was cancelled before it completed.
    #[error("run cancelled; partial results discarded")]
    Cancelled,
    /// A concept identifier failed validation.
    #[error("invalid concept identifier: {0:?}")]
    InvalidConcept(String),
    /// Configuration failed validation.
    #[error("invalid matcher config: {0}")]
    InvalidConfig(String),
}

impl MatchError {
    /// Convenience constructor for remote failures.
    pub fn unavailable(matcher: impl Into<String>, reason: impl Into<String>) -> Self {
        MatchError::MatcherUnavailable {
            matcher: matcher.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the comparison backend rather than by
    /// configuration or run control.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            MatchError::MatcherUnavailable { .. } | MatchError::Timeout { .. }
        )
    }
}
