//! warpreg-api — HTTP interface to the worker registry.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthcheck` | Registry liveness |
//! | POST | `/register` | Register or refresh a worker |
//! | GET | `/worker/health?address=host:port` | Health of one worker |
//! | GET | `/workers/healthy` | Routable `host:port` list |
//! | GET | `/workers/{id}` | Worker record |
//! | DELETE | `/workers/{id}` | Remove a worker |
//! | POST | `/workers/check` | Run a health sweep now |
//! | GET | `/metrics` | Prometheus exposition (no auth) |
//!
//! Every route except `/metrics` requires the shared secret in `X-API-Key`.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use warpreg_metrics::RegistryMetrics;
use warpreg_registry::Registry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
    pub metrics: Arc<RegistryMetrics>,
    pub api_key: Arc<str>,
}

impl ApiState {
    /// Serve `registry`, reporting into the registry's own metrics collector.
    pub fn new(registry: Registry, api_key: &str) -> Self {
        let metrics = Arc::clone(registry.metrics());
        Self {
            registry,
            metrics,
            api_key: Arc::from(api_key),
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/register", post(handlers::register))
        .route("/worker/health", get(handlers::worker_health))
        .route("/workers/healthy", get(handlers::healthy_workers))
        .route("/workers/check", post(handlers::check_workers))
        .route(
            "/workers/{id}",
            get(handlers::get_worker).delete(handlers::remove_worker),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/metrics", get(handlers::prometheus_metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_requests,
        ))
        .layer(axum::middleware::from_fn(middleware::add_request_id))
        .with_state(state)
}
