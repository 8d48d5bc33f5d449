use matcher::MatchError;
use thiserror::Error;

/// Errors surfaced by discovery. Empty result sets are not errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("invalid discovery config: {0}")]
    InvalidConfig(String),
}
