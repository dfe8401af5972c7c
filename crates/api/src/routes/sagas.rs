//! Saga inspection and recovery.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{AggregateId, ErrorKind};
use event_store::EventStore;
use saga::{SagaInstance, SagaRunner, SagaState};
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub saga_id: AggregateId,
    pub workflow: String,
    pub idempotency_key: String,
    pub state: SagaState,
    pub attempt: u32,
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<ErrorKind>,
    pub output: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SagaStatusResponse {
    fn new(saga_id: AggregateId, saga: &SagaInstance) -> Self {
        Self {
            saga_id,
            workflow: saga.workflow().to_string(),
            idempotency_key: saga.idempotency_key().to_string(),
            state: saga.state(),
            attempt: saga.attempt(),
            completed_steps: saga
                .completed_steps()
                .into_iter()
                .map(String::from)
                .collect(),
            failed_step: saga.failed_step().map(String::from),
            failure_reason: saga.failure_reason().map(String::from),
            failure_kind: saga.failure_kind(),
            output: saga.output().cloned(),
            started_at: saga.started_at(),
            finished_at: saga.finished_at(),
        }
    }
}

#[derive(Serialize)]
pub struct RecoverResponse {
    pub state: SagaState,
}

/// GET /sagas/{workflow}/{key}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((workflow, key)): Path<(String, String)>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let saga = state
        .marketplace
        .saga(&workflow, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No {workflow} run for key {key}")))?;
    let saga_id = SagaRunner::<S>::saga_id(&workflow, &key);
    Ok(Json(SagaStatusResponse::new(saga_id, &saga)))
}

/// POST /sagas/{workflow}/{key}/recover: compensate an interrupted run.
#[tracing::instrument(skip(state))]
pub async fn recover<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((workflow, key)): Path<(String, String)>,
) -> Result<Json<RecoverResponse>, ApiError> {
    let saga_state = state.marketplace.recover(&workflow, &key).await?;
    Ok(Json(RecoverResponse { state: saga_state }))
}
