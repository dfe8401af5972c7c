//! HTTP ingress for the marketplace core.
//!
//! Provides the inbound event endpoint, commission rule and payout account
//! administration, and read endpoints over orders, split payments and sagas,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{Collaborators, HookRegistry, Marketplace, workflows::ORDER_SET_PLACED};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::render_metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/events", post(routes::events::publish::<S>))
        .route(
            "/commission-rules",
            post(routes::commission::create::<S>).get(routes::commission::list::<S>),
        )
        .route("/commission-rules/{id}", get(routes::commission::get::<S>))
        .route(
            "/commission-rules/{id}/activate",
            post(routes::commission::activate::<S>),
        )
        .route(
            "/commission-rules/{id}/deactivate",
            post(routes::commission::deactivate::<S>),
        )
        .route("/payout-accounts", post(routes::payouts::create::<S>))
        .route(
            "/payout-accounts/{seller_id}",
            get(routes::payouts::get::<S>),
        )
        .route(
            "/payout-accounts/{seller_id}/onboarding",
            post(routes::payouts::onboarding::<S>),
        )
        .route(
            "/payout-accounts/{seller_id}/payouts",
            post(routes::payouts::create_payout::<S>),
        )
        .route("/order-sets/{id}", get(routes::orders::get_order_set::<S>))
        .route("/orders/{id}", get(routes::orders::get_order::<S>))
        .route(
            "/orders/{id}/commission-lines",
            get(routes::orders::commission_lines::<S>),
        )
        .route(
            "/orders/{id}/split-payment",
            get(routes::orders::split_payment_for_order::<S>),
        )
        .route(
            "/split-payments/{id}",
            get(routes::orders::get_split_payment::<S>),
        )
        .route("/sagas/{workflow}/{key}", get(routes::sagas::get::<S>))
        .route(
            "/sagas/{workflow}/{key}/recover",
            post(routes::sagas::recover::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Completion hooks installed by the server.
pub fn default_hooks() -> HookRegistry {
    HookRegistry::builder()
        .on(ORDER_SET_PLACED, |payload| async move {
            let order_set_id = payload
                .pointer("/split/order_set_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            tracing::info!(%order_set_id, "order set placed");
            Ok(())
        })
        .build()
}

/// Creates the application state over the given collaborators.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    deps: Collaborators,
    config: &Config,
) -> Arc<AppState<S>> {
    let marketplace = Marketplace::new(event_store, deps)
        .with_retry_policy(config.retry_policy())
        .with_hooks(default_hooks());
    Arc::new(AppState::new(marketplace))
}

/// Creates the default application state with in-memory collaborators.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    create_state(event_store, Collaborators::in_memory(), config)
}
