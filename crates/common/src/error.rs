//! Error classification shared by every layer.

use serde::{Deserialize, Serialize};

/// Broad category of a failure, used to decide retries and HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request is invalid; nothing was mutated.
    Validation,
    /// The request conflicts with existing state.
    Conflict,
    /// A referenced record or configuration is missing.
    NotFound,
    /// An infrastructure failure that may succeed if retried.
    Transient,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
