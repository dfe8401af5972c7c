//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use saga::SUBSCRIPTIONS;
use serde::Serialize;

use crate::routes::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Inbound events with at least one subscriber.
    pub subscriptions: Vec<&'static str>,
}

/// GET /health: liveness plus the wired event subscriptions.
pub async fn check<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let subscriptions = SUBSCRIPTIONS
        .into_iter()
        .filter(|name| state.bus.subscriber_count(name) > 0)
        .collect();
    Json(HealthResponse {
        status: "ok",
        subscriptions,
    })
}
