//! Commission rule administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CommissionRuleId;
use domain::{CommissionRule, NewCommissionRule};
use event_store::EventStore;

use crate::error::ApiError;
use crate::routes::AppState;

/// POST /commission-rules: create a rule.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewCommissionRule>,
) -> Result<(StatusCode, Json<CommissionRule>), ApiError> {
    let rule = state.marketplace.create_commission_rule(req).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /commission-rules
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<CommissionRule>>, ApiError> {
    Ok(Json(state.marketplace.commission_rules().await?))
}

/// GET /commission-rules/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<CommissionRuleId>,
) -> Result<Json<CommissionRule>, ApiError> {
    state
        .marketplace
        .commission_rule(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Commission rule {id} not found")))
}

/// POST /commission-rules/{id}/activate
#[tracing::instrument(skip(state))]
pub async fn activate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<CommissionRuleId>,
) -> Result<Json<CommissionRule>, ApiError> {
    Ok(Json(
        state.marketplace.set_commission_rule_active(id, true).await?,
    ))
}

/// POST /commission-rules/{id}/deactivate
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<CommissionRuleId>,
) -> Result<Json<CommissionRule>, ApiError> {
    Ok(Json(
        state.marketplace.set_commission_rule_active(id, false).await?,
    ))
}
