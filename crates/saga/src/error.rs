//! Saga error types.

use common::{AggregateId, ErrorKind};
use domain::DomainError;
use event_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is invalid; nothing was executed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced record is missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An external collaborator failed.
    #[error("{service} failed: {reason}")]
    Service {
        service: &'static str,
        kind: ErrorKind,
        reason: String,
    },

    /// Another run with the same idempotency key has not finished yet.
    #[error("Saga {saga_id} is already in progress")]
    InProgress { saga_id: AggregateId },

    /// A step failed and the completed steps were compensated.
    #[error("Workflow {workflow} failed at step '{step}': {reason}")]
    WorkflowFailed {
        saga_id: AggregateId,
        workflow: String,
        step: String,
        reason: String,
        kind: ErrorKind,
    },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// A collaborator failure that may succeed when retried.
    pub fn transient(service: &'static str, reason: impl Into<String>) -> Self {
        SagaError::Service {
            service,
            kind: ErrorKind::Transient,
            reason: reason.into(),
        }
    }

    /// A collaborator failure that retrying will not fix.
    pub fn rejected(service: &'static str, reason: impl Into<String>) -> Self {
        SagaError::Service {
            service,
            kind: ErrorKind::Validation,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) => ErrorKind::Validation,
            SagaError::Conflict(_) | SagaError::InProgress { .. } => ErrorKind::Conflict,
            SagaError::NotFound(_) => ErrorKind::NotFound,
            SagaError::Service { kind, .. } | SagaError::WorkflowFailed { kind, .. } => *kind,
            SagaError::Domain(e) => e.kind(),
            SagaError::EventStore(e) => e.kind(),
            SagaError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
