//! Inbound event endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use event_store::EventStore;
use saga::MarketplaceEvent;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Serialize)]
pub struct PublishResponse {
    /// The event and every follow-up it produced, in publish order.
    pub published: Vec<MarketplaceEvent>,
}

/// POST /events: publish an inbound marketplace event.
///
/// The body is `{ "name": ..., "data": { ... } }`. A redelivered event is
/// answered from the stored run of the workflow it triggers.
#[tracing::instrument(skip(state, event), fields(event = event.name()))]
pub async fn publish<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(event): Json<MarketplaceEvent>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    metrics::counter!("api_events_received_total", "event" => event.name()).increment(1);
    let published = state.bus.publish(event).await?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { published })))
}
