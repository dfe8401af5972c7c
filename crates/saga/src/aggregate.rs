//! Saga instance aggregate.

use chrono::{DateTime, Utc};
use common::{AggregateId, ErrorKind};
use domain::Aggregate;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::state::SagaState;

/// A step of the current attempt that finished, with its undo token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub name: String,
    pub undo: serde_json::Value,
}

/// An event-sourced saga instance.
///
/// One instance exists per (workflow, idempotency key). It tracks the steps
/// completed by the current attempt so a crashed run can be compensated
/// from the store alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<AggregateId>,
    version: Version,
    workflow: String,
    idempotency_key: String,
    attempt: u32,
    state: SagaState,
    current_step: usize,
    completed_steps: Vec<CompletedStep>,
    compensated_steps: usize,
    failed_step: Option<String>,
    failure_reason: Option<String>,
    failure_kind: Option<ErrorKind>,
    output: Option<serde_json::Value>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Aggregate for SagaInstance {
    type Event = SagaEvent;
    type Error = SagaError;

    fn aggregate_type() -> &'static str {
        "Saga"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.workflow = data.workflow;
                self.idempotency_key = data.idempotency_key;
                self.attempt = data.attempt;
                self.state = SagaState::Running;
                self.current_step = 0;
                self.completed_steps.clear();
                self.compensated_steps = 0;
                self.failed_step = None;
                self.failure_reason = None;
                self.failure_kind = None;
                self.output = None;
                self.started_at = Some(data.started_at);
                self.finished_at = None;
            }
            SagaEvent::StepStarted(_) => {
                self.current_step += 1;
            }
            SagaEvent::StepCompleted(data) => {
                self.completed_steps.push(CompletedStep {
                    name: data.step_name,
                    undo: data.undo,
                });
            }
            SagaEvent::StepFailed(data) => {
                self.failed_step = Some(data.step_name);
                self.failure_reason = Some(data.error);
                self.failure_kind = Some(data.kind);
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(_) | SagaEvent::CompensationStepFailed(_) => {
                self.compensated_steps += 1;
            }
            SagaEvent::SagaCompleted(data) => {
                self.state = SagaState::Completed;
                self.output = Some(data.output);
                self.finished_at = Some(data.completed_at);
            }
            SagaEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason);
                if data.failed_step.is_some() {
                    self.failed_step = data.failed_step;
                }
                self.failure_kind = Some(data.kind);
                self.finished_at = Some(data.failed_at);
            }
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Names of the steps completed by the current attempt, in order.
    pub fn completed_steps(&self) -> Vec<&str> {
        self.completed_steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Completed steps whose compensation has not been attempted yet,
    /// most recent first.
    pub fn pending_compensations(&self) -> Vec<CompletedStep> {
        let remaining = self
            .completed_steps
            .len()
            .saturating_sub(self.compensated_steps);
        self.completed_steps[..remaining]
            .iter()
            .rev()
            .cloned()
            .collect()
    }

    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure_kind
    }

    /// Serialized workflow context of a completed run.
    pub fn output(&self) -> Option<&serde_json::Value> {
        self.output.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}
