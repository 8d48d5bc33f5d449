use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Opaque, URI-like identifier naming a capability or type.
///
/// Equality and ordering are by value. Cloning is cheap, so concepts are used
/// directly as map keys throughout the workspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Concept(Arc<str>);

impl Concept {
    /// Wrap an identifier without validation.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Concept(id.into())
    }

    /// Wrap an identifier, rejecting empty or whitespace-only input.
    pub fn parse(id: &str) -> Result<Self, MatchError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(MatchError::InvalidConcept(id.to_string()));
        }
        Ok(Concept(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything up to and including the last `#` or `/`, or `""` when the
    /// identifier has neither.
    pub fn namespace(&self) -> &str {
        match self.split_index() {
            Some(idx) => &self.0[..=idx],
            None => "",
        }
    }

    /// Everything after the last `#` or `/`.
    pub fn local_name(&self) -> &str {
        match self.split_index() {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    fn split_index(&self) -> Option<usize> {
        self.0.rfind(['#', '/'])
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Concept {
    fn from(value: &str) -> Self {
        Concept::new(value)
    }
}

impl From<String> for Concept {
    fn from(value: String) -> Self {
        Concept::new(value)
    }
}

impl AsRef<str> for Concept {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
