//! Read endpoints for order sets, seller orders and split payments.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{AggregateId, Money, OrderId, OrderSetId, PaymentCollectionId, SellerId};
use domain::{CommissionLine, Order, OrderSet, SplitOrderPayment, SplitPaymentStatus};
use event_store::EventStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::AppState;

// -- Response types --

#[derive(Serialize)]
pub struct OrderSetResponse {
    #[serde(flatten)]
    pub order_set: OrderSet,
    pub orders: Vec<Order>,
}

#[derive(Serialize)]
pub struct SplitPaymentResponse {
    pub id: AggregateId,
    pub order_id: Option<OrderId>,
    pub seller_id: Option<SellerId>,
    pub payment_collection_id: Option<PaymentCollectionId>,
    pub status: SplitPaymentStatus,
    pub authorized: Money,
    pub captured: Money,
    pub refunded: Money,
}

impl SplitPaymentResponse {
    fn from_payment(id: AggregateId, payment: &SplitOrderPayment) -> Self {
        Self {
            id,
            order_id: payment.order_id(),
            seller_id: payment.seller_id(),
            payment_collection_id: payment.payment_collection_id(),
            status: payment.status(),
            authorized: payment.authorized(),
            captured: payment.captured(),
            refunded: payment.refunded(),
        }
    }
}

// -- Handlers --

/// GET /order-sets/{id}: the order set with its seller orders.
#[tracing::instrument(skip(state))]
pub async fn get_order_set<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OrderSetId>,
) -> Result<Json<OrderSetResponse>, ApiError> {
    let order_set = state
        .marketplace
        .order_set(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order set {id} not found")))?;
    let orders = state.marketplace.orders_for_set(id).await?;
    Ok(Json(OrderSetResponse { order_set, orders }))
}

/// GET /orders/{id}
pub async fn get_order<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    state
        .marketplace
        .order(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}

/// GET /orders/{id}/commission-lines
pub async fn commission_lines<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<CommissionLine>>, ApiError> {
    Ok(Json(state.marketplace.commission_lines(id).await?))
}

/// GET /orders/{id}/split-payment
pub async fn split_payment_for_order<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<OrderId>,
) -> Result<Json<SplitPaymentResponse>, ApiError> {
    split_payment_response(&state, SplitOrderPayment::id_for(id)).await
}

/// GET /split-payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get_split_payment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<AggregateId>,
) -> Result<Json<SplitPaymentResponse>, ApiError> {
    split_payment_response(&state, id).await
}

async fn split_payment_response<S: EventStore + Clone + 'static>(
    state: &AppState<S>,
    id: AggregateId,
) -> Result<Json<SplitPaymentResponse>, ApiError> {
    let payment = state
        .marketplace
        .split_payment(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Split payment {id} not found")))?;
    Ok(Json(SplitPaymentResponse::from_payment(id, &payment)))
}
