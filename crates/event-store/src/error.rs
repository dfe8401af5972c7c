use common::ErrorKind;
use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A concurrency conflict occurred when appending events.
    /// The expected version did not match the actual version.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The aggregate was not found in the event store.
    #[error("Aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// The batch handed to `append` is malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// An envelope was built without a required field.
    #[error("Invalid envelope: missing {0}")]
    InvalidEnvelope(&'static str),

    /// The backing store could not be reached.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Classifies the error for retry and reporting decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventStoreError::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            EventStoreError::AggregateNotFound(_) => ErrorKind::NotFound,
            EventStoreError::Unavailable(_) => ErrorKind::Transient,
            EventStoreError::InvalidAppend(_)
            | EventStoreError::InvalidEnvelope(_)
            | EventStoreError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for optimistic-concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
