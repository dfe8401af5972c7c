//! HTTP route handlers.

pub mod commission;
pub mod events;
pub mod health;
pub mod orders;
pub mod payouts;
pub mod sagas;

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{EventBus, Marketplace};

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub marketplace: Arc<Marketplace<S>>,
    pub bus: EventBus,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    pub fn new(marketplace: Marketplace<S>) -> Self {
        let marketplace = Arc::new(marketplace);
        let bus = marketplace.event_bus();
        Self { marketplace, bus }
    }
}

/// GET /metrics: Prometheus exposition of the saga, bus and HTTP counters.
pub async fn render_metrics(
    State(handle): State<PrometheusHandle>,
) -> ([(header::HeaderName, &'static str); 1], String) {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
