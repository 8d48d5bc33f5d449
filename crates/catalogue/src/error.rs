use thiserror::Error;

/// Errors raised while building or reading a catalogue.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("duplicate resource id: {0}")]
    DuplicateId(String),
    #[error("invalid resource {id}: {reason}")]
    InvalidResource { id: String, reason: String },
    #[error("catalogue backend error: {0}")]
    Backend(String),
    #[error("catalogue JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalogue I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogueError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
