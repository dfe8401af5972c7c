//! Steps, undo tokens and workflows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::SagaError;

/// What a completed step needs to undo its effect.
///
/// The token is persisted in the saga's `StepCompleted` event, so a step
/// must be able to compensate from the token alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Undo(serde_json::Value);

impl Undo {
    /// A step with nothing to undo.
    pub fn none() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn new<T: Serialize>(token: &T) -> Result<Self, SagaError> {
        Ok(Self(serde_json::to_value(token)?))
    }

    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_null()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SagaError> {
        Ok(serde_json::from_value(self.0.clone())?)
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Bounded retry with exponential backoff for transient step failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: 2,
        }
    }

    /// Run once, never retry.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

/// One compensable unit of work in a workflow over context `C`.
///
/// `execute` may read and extend the context; later steps see what earlier
/// steps wrote. `compensate` receives the token returned by `execute` and
/// must be safe to call when the forward effect is only partly visible.
#[async_trait]
pub trait Step<C: Send + Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<Undo, SagaError>;

    async fn compensate(&self, undo: Undo) -> Result<(), SagaError>;

    /// Overrides the runner's retry policy for this step.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }
}

/// An ordered list of steps plus the hooks fired when it completes.
pub struct Workflow<C: Send + Sync> {
    name: &'static str,
    steps: Vec<Arc<dyn Step<C>>>,
    hooks: Vec<&'static str>,
}

impl<C: Send + Sync> Workflow<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Names an extension point fired with the final context on success.
    pub fn hook(mut self, name: &'static str) -> Self {
        self.hooks.push(name);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn steps(&self) -> &[Arc<dyn Step<C>>] {
        &self.steps
    }

    pub fn hooks(&self) -> &[&'static str] {
        &self.hooks
    }

    /// Looks a step up by name for compensation.
    ///
    /// Steps sharing a name compensate from their token alone, so the first
    /// match serves all of them.
    pub fn find_step(&self, name: &str) -> Option<&Arc<dyn Step<C>>> {
        self.steps.iter().find(|s| s.name() == name)
    }
}
