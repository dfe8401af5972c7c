//! Payout account administration.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId, PayoutId, SellerId};
use domain::{
    AccountStatus, Aggregate, Onboarding, Payout, PayoutAccount, PayoutBalance,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub seller_id: SellerId,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Deserialize)]
pub struct OnboardingRequest {
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Deserialize)]
pub struct CreatePayoutRequest {
    pub order_id: OrderId,
    pub amount: Money,
}

// -- Response types --

#[derive(Serialize)]
pub struct PayoutAccountResponse {
    pub id: Option<common::AggregateId>,
    pub seller_id: Option<SellerId>,
    pub status: AccountStatus,
    pub reference_id: String,
    pub data: serde_json::Value,
    pub onboarding: Option<Onboarding>,
    pub payouts: Vec<Payout>,
    pub balances: Vec<PayoutBalance>,
}

impl From<&PayoutAccount> for PayoutAccountResponse {
    fn from(account: &PayoutAccount) -> Self {
        Self {
            id: account.id(),
            seller_id: account.seller_id(),
            status: account.status(),
            reference_id: account.reference_id().to_string(),
            data: account.data().clone(),
            onboarding: account.onboarding().cloned(),
            payouts: account.payouts().to_vec(),
            balances: account.balances().cloned().collect(),
        }
    }
}

#[derive(Serialize)]
pub struct OnboardingResponse {
    pub seller_id: SellerId,
    pub session: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct PayoutResponse {
    pub payout_id: PayoutId,
    pub order_id: OrderId,
    pub amount: Money,
    pub transfer_id: Option<String>,
}

// -- Handlers --

/// POST /payout-accounts: create a seller's payout account.
#[tracing::instrument(skip(state, req), fields(seller_id = %req.seller_id))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<PayoutAccountResponse>), ApiError> {
    state
        .marketplace
        .create_payout_account(req.seller_id, req.context)
        .await?;
    let account = load(&state, req.seller_id).await?;
    Ok((StatusCode::CREATED, Json(PayoutAccountResponse::from(&account))))
}

/// GET /payout-accounts/{seller_id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(seller_id): Path<SellerId>,
) -> Result<Json<PayoutAccountResponse>, ApiError> {
    let account = load(&state, seller_id).await?;
    Ok(Json(PayoutAccountResponse::from(&account)))
}

/// POST /payout-accounts/{seller_id}/onboarding
#[tracing::instrument(skip(state, req))]
pub async fn onboarding<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(seller_id): Path<SellerId>,
    Json(req): Json<OnboardingRequest>,
) -> Result<Json<OnboardingResponse>, ApiError> {
    let outcome = state
        .marketplace
        .initialize_onboarding(seller_id, req.context)
        .await?;
    Ok(Json(OnboardingResponse {
        seller_id,
        session: outcome.context.session,
    }))
}

/// POST /payout-accounts/{seller_id}/payouts
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn create_payout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(seller_id): Path<SellerId>,
    Json(req): Json<CreatePayoutRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>), ApiError> {
    let outcome = state
        .marketplace
        .create_payout(seller_id, req.order_id, req.amount)
        .await?;
    let payout = outcome.context;
    Ok((
        StatusCode::CREATED,
        Json(PayoutResponse {
            payout_id: payout.payout_id,
            order_id: payout.order_id,
            amount: payout.amount,
            transfer_id: payout.transfer_id,
        }),
    ))
}

async fn load<S: EventStore + Clone + 'static>(
    state: &AppState<S>,
    seller_id: SellerId,
) -> Result<PayoutAccount, ApiError> {
    state
        .marketplace
        .payout_account(seller_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Payout account of seller {seller_id} not found")))
}
