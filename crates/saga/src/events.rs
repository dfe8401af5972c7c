//! Saga domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, ErrorKind};
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

/// Events that can occur during saga execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// A run of the workflow started (first run or a retry after failure).
    SagaStarted(SagaStartedData),

    /// A saga step started execution.
    StepStarted(StepData),

    /// A saga step completed successfully.
    StepCompleted(StepCompletedData),

    /// A saga step failed.
    StepFailed(StepFailedData),

    /// Compensation started after a step failure.
    CompensationStarted(CompensationData),

    /// A compensation step completed successfully.
    CompensationStepCompleted(StepData),

    /// A compensation step failed (logged, compensation continues).
    CompensationStepFailed(CompensationFailedData),

    /// Saga completed successfully.
    SagaCompleted(SagaCompletedData),

    /// Saga failed after compensation.
    SagaFailed(SagaFailedData),
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: AggregateId,
    /// Workflow name, e.g. "place_order_set".
    pub workflow: String,
    pub idempotency_key: String,
    /// 1 for the first run, incremented when a failed key runs again.
    pub attempt: u32,
    /// The workflow context the run started with.
    pub input: serde_json::Value,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepData {
    pub step_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step_name: String,
    /// Everything the step's compensation needs.
    pub undo: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step_name: String,
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationData {
    /// The step that triggered compensation.
    pub from_step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub step_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaCompletedData {
    /// Final workflow context, returned to replays of the same key.
    pub output: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaFailedData {
    pub reason: String,
    pub failed_step: Option<String>,
    pub kind: ErrorKind,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(
        saga_id: AggregateId,
        workflow: impl Into<String>,
        idempotency_key: impl Into<String>,
        attempt: u32,
        input: serde_json::Value,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            workflow: workflow.into(),
            idempotency_key: idempotency_key.into(),
            attempt,
            input,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(step_name: impl Into<String>) -> Self {
        SagaEvent::StepStarted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn step_completed(step_name: impl Into<String>, undo: serde_json::Value) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            undo,
        })
    }

    pub fn step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
            kind,
        })
    }

    pub fn compensation_started(from_step: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            from_step: from_step.into(),
        })
    }

    pub fn compensation_step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn compensation_step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationStepFailed(CompensationFailedData {
            step_name: step_name.into(),
            error: error.into(),
        })
    }

    pub fn saga_completed(output: serde_json::Value) -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            output,
            completed_at: Utc::now(),
        })
    }

    pub fn saga_failed(
        reason: impl Into<String>,
        failed_step: Option<String>,
        kind: ErrorKind,
    ) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_step,
            kind,
            failed_at: Utc::now(),
        })
    }
}
