//! Saga runner for executing workflows with compensation.

use std::time::Instant;

use common::{AggregateId, ErrorKind};
use domain::{Aggregate, DomainEvent};
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::aggregate::{CompletedStep, SagaInstance};
use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::hooks::HookRegistry;
use crate::state::SagaState;
use crate::step::{RetryPolicy, Step, Undo, Workflow};

/// Namespace for saga ids derived from (workflow, idempotency key).
const SAGA_NAMESPACE: Uuid = Uuid::from_u128(0x7f3c_51a2_0d4e_4b8f_9a61_c2e5_38d0_b7a4);

/// Result of [`SagaRunner::run`].
#[derive(Debug)]
pub struct RunOutcome<C> {
    pub saga_id: AggregateId,
    /// Final context of the run, or the stored one for a replay.
    pub context: C,
    /// True if the key had already completed and nothing was executed.
    pub replayed: bool,
    pub attempt: u32,
}

/// Executes workflows step by step, persisting progress as saga events.
///
/// On a step failure every completed step is compensated, most recent
/// first. The saga id is derived from the workflow name and idempotency key,
/// so redelivered triggers find the earlier run instead of starting anew.
pub struct SagaRunner<S: EventStore> {
    store: S,
    retry: RetryPolicy,
    hooks: HookRegistry,
}

impl<S: EventStore> SagaRunner<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            hooks: HookRegistry::default(),
        }
    }

    /// Sets the default retry policy for transient step failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn saga_id(workflow: &str, idempotency_key: &str) -> AggregateId {
        AggregateId::derived(&SAGA_NAMESPACE, &format!("{workflow}:{idempotency_key}"))
    }

    /// Runs `workflow` once per idempotency key.
    ///
    /// A completed key returns its stored context without executing anything.
    /// A failed key starts a new attempt. A key whose run has not finished is
    /// rejected with [`SagaError::InProgress`].
    #[tracing::instrument(
        skip(self, workflow, ctx),
        fields(workflow = workflow.name(), saga_id = tracing::field::Empty)
    )]
    pub async fn run<C>(
        &self,
        workflow: &Workflow<C>,
        idempotency_key: &str,
        mut ctx: C,
    ) -> Result<RunOutcome<C>, SagaError>
    where
        C: Serialize + DeserializeOwned + Send + Sync,
    {
        let name = workflow.name();
        metrics::counter!("saga_executions_total", "workflow" => name).increment(1);
        let saga_start = Instant::now();
        let saga_id = Self::saga_id(name, idempotency_key);
        tracing::Span::current().record("saga_id", tracing::field::display(saga_id));

        let saga = self.load(saga_id).await?;
        match saga.state() {
            SagaState::Completed => {
                let output = saga.output().cloned().unwrap_or_default();
                metrics::counter!("saga_replayed", "workflow" => name).increment(1);
                tracing::info!(%saga_id, idempotency_key, "saga already completed, replaying output");
                return Ok(RunOutcome {
                    saga_id,
                    context: serde_json::from_value(output)?,
                    replayed: true,
                    attempt: saga.attempt(),
                });
            }
            state if state.is_in_flight() => return Err(SagaError::InProgress { saga_id }),
            _ => {}
        }

        let attempt = saga.attempt() + 1;
        let started_event = SagaEvent::saga_started(
            saga_id,
            name,
            idempotency_key,
            attempt,
            serde_json::to_value(&ctx)?,
        );
        let mut version = match self
            .append_saga_event(saga_id, idempotency_key, saga.version(), &started_event)
            .await
        {
            Err(SagaError::EventStore(e)) if e.is_conflict() => {
                return Err(SagaError::InProgress { saga_id });
            }
            other => other?,
        };

        let mut completed: Vec<CompletedStep> = Vec::new();
        for step in workflow.steps() {
            let step_name = step.name();
            tracing::info!(step = step_name, "saga step started");
            version = self
                .append_saga_event(
                    saga_id,
                    idempotency_key,
                    version,
                    &SagaEvent::step_started(step_name),
                )
                .await?;

            match self.execute_step(step.as_ref(), &mut ctx).await {
                Ok(undo) => {
                    let undo = undo.into_value();
                    version = self
                        .append_saga_event(
                            saga_id,
                            idempotency_key,
                            version,
                            &SagaEvent::step_completed(step_name, undo.clone()),
                        )
                        .await?;
                    completed.push(CompletedStep {
                        name: step_name.to_string(),
                        undo,
                    });
                }
                Err(error) => {
                    let kind = error.kind();
                    let reason = error.to_string();
                    tracing::warn!(step = step_name, %error, "saga step failed");
                    version = self
                        .append_saga_event(
                            saga_id,
                            idempotency_key,
                            version,
                            &SagaEvent::step_failed(step_name, reason.clone(), kind),
                        )
                        .await?;

                    version = self
                        .append_saga_event(
                            saga_id,
                            idempotency_key,
                            version,
                            &SagaEvent::compensation_started(step_name),
                        )
                        .await?;
                    completed.reverse();
                    version = self
                        .compensate(workflow, saga_id, idempotency_key, version, completed)
                        .await?;

                    self.append_saga_event(
                        saga_id,
                        idempotency_key,
                        version,
                        &SagaEvent::saga_failed(reason.clone(), Some(step_name.to_string()), kind),
                    )
                    .await?;

                    metrics::histogram!("saga_duration_seconds", "workflow" => name)
                        .record(saga_start.elapsed().as_secs_f64());
                    metrics::counter!("saga_failed", "workflow" => name).increment(1);
                    tracing::warn!(%saga_id, step = step_name, %reason, "saga failed");

                    return Err(SagaError::WorkflowFailed {
                        saga_id,
                        workflow: name.to_string(),
                        step: step_name.to_string(),
                        reason,
                        kind,
                    });
                }
            }
        }

        let output = serde_json::to_value(&ctx)?;
        self.append_saga_event(
            saga_id,
            idempotency_key,
            version,
            &SagaEvent::saga_completed(output.clone()),
        )
        .await?;

        for hook in workflow.hooks() {
            self.hooks.fire(*hook, &output);
        }

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds", "workflow" => name).record(duration);
        metrics::counter!("saga_completed", "workflow" => name).increment(1);
        tracing::info!(%saga_id, duration, "saga completed successfully");

        Ok(RunOutcome {
            saga_id,
            context: ctx,
            replayed: false,
            attempt,
        })
    }

    /// Compensates a run that stopped while `Running` or `Compensating`,
    /// e.g. after a crash, and marks it failed.
    ///
    /// Returns the resulting state; runs that are not in flight are left as is.
    #[tracing::instrument(skip(self, workflow), fields(workflow = workflow.name()))]
    pub async fn recover<C>(
        &self,
        workflow: &Workflow<C>,
        idempotency_key: &str,
    ) -> Result<SagaState, SagaError>
    where
        C: Send + Sync,
    {
        let saga_id = Self::saga_id(workflow.name(), idempotency_key);
        let saga = self.load(saga_id).await?;
        if !saga.state().is_in_flight() {
            return Ok(saga.state());
        }

        let mut version = saga.version();
        let from_step = saga.failed_step().unwrap_or("interrupted").to_string();
        if saga.state() == SagaState::Running {
            version = self
                .append_saga_event(
                    saga_id,
                    idempotency_key,
                    version,
                    &SagaEvent::compensation_started(from_step.clone()),
                )
                .await?;
        }

        version = self
            .compensate(
                workflow,
                saga_id,
                idempotency_key,
                version,
                saga.pending_compensations(),
            )
            .await?;

        let kind = saga.failure_kind().unwrap_or(ErrorKind::Internal);
        self.append_saga_event(
            saga_id,
            idempotency_key,
            version,
            &SagaEvent::saga_failed("interrupted run recovered", Some(from_step), kind),
        )
        .await?;

        metrics::counter!("saga_recovered", "workflow" => workflow.name()).increment(1);
        tracing::warn!(%saga_id, "interrupted saga compensated");
        Ok(SagaState::Failed)
    }

    /// Loads a saga instance by ID from the event store.
    pub async fn get_saga(&self, saga_id: AggregateId) -> Result<Option<SagaInstance>, SagaError> {
        let events = self.store.get_events_for_aggregate(saga_id).await?;

        let Some(last) = events.last() else {
            return Ok(None);
        };
        let version = last.version;

        let mut saga = SagaInstance::default();
        for envelope in events {
            let event: SagaEvent = envelope.decode()?;
            saga.apply(event);
        }
        saga.set_version(version);
        Ok(Some(saga))
    }

    /// Loads the saga of a workflow run by its idempotency key.
    pub async fn find_saga(
        &self,
        workflow: &str,
        idempotency_key: &str,
    ) -> Result<Option<SagaInstance>, SagaError> {
        self.get_saga(Self::saga_id(workflow, idempotency_key)).await
    }

    async fn load(&self, saga_id: AggregateId) -> Result<SagaInstance, SagaError> {
        Ok(self.get_saga(saga_id).await?.unwrap_or_default())
    }

    async fn execute_step<C: Send + Sync>(
        &self,
        step: &dyn Step<C>,
        ctx: &mut C,
    ) -> Result<Undo, SagaError> {
        let policy = step.retry_policy().unwrap_or(self.retry);
        let mut attempt = 1;
        loop {
            match step.execute(ctx).await {
                Err(error) if error.kind().is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    metrics::counter!("saga_step_retries", "step" => step.name()).increment(1);
                    tracing::debug!(step = step.name(), attempt, ?delay, %error, "transient failure, retrying step");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Runs the undo of each step in `pending`, in the given order.
    ///
    /// A failing undo is recorded and logged; the remaining undos still run.
    async fn compensate<C: Send + Sync>(
        &self,
        workflow: &Workflow<C>,
        saga_id: AggregateId,
        idempotency_key: &str,
        mut version: Version,
        pending: Vec<CompletedStep>,
    ) -> Result<Version, SagaError> {
        for completed in pending {
            let result = match workflow.find_step(&completed.name) {
                Some(step) => {
                    self.compensate_step(step.as_ref(), Undo::from_value(completed.undo))
                        .await
                }
                None => Err(SagaError::NotFound(format!(
                    "step '{}' in workflow {}",
                    completed.name,
                    workflow.name()
                ))),
            };

            let event = match result {
                Ok(()) => SagaEvent::compensation_step_completed(completed.name.clone()),
                Err(error) => {
                    metrics::counter!("saga_compensation_failures", "step" => completed.name.clone())
                        .increment(1);
                    tracing::error!(%saga_id, step = %completed.name, %error, "compensation step failed");
                    SagaEvent::compensation_step_failed(completed.name.clone(), error.to_string())
                }
            };
            version = self
                .append_saga_event(saga_id, idempotency_key, version, &event)
                .await?;
        }
        Ok(version)
    }

    async fn compensate_step<C: Send + Sync>(
        &self,
        step: &dyn Step<C>,
        undo: Undo,
    ) -> Result<(), SagaError> {
        let policy = step.retry_policy().unwrap_or(self.retry);
        let mut attempt = 1;
        loop {
            match step.compensate(undo.clone()).await {
                Err(error) if error.kind().is_retryable() && attempt < policy.max_attempts => {
                    tokio::time::sleep(policy.backoff(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Appends a single saga event to the event store.
    async fn append_saga_event(
        &self,
        saga_id: AggregateId,
        idempotency_key: &str,
        current_version: Version,
        event: &SagaEvent,
    ) -> Result<Version, SagaError> {
        let next_version = current_version.next();

        let envelope = EventEnvelope::builder()
            .event_type(event.event_type())
            .aggregate_id(saga_id)
            .aggregate_type(SagaInstance::aggregate_type())
            .version(next_version)
            .correlation_id(idempotency_key)
            .payload(event)?
            .build()?;

        let options = if current_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(current_version)
        };

        Ok(self.store.append(vec![envelope], options).await?)
    }
}
