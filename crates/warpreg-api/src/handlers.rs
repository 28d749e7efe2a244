//! HTTP handlers.
//!
//! Handlers are thin: they decode the request, call the registry and map
//! the outcome onto a status code.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ApiState;

/// Upper bound on registration bodies.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// JSON envelope for errors and plain acknowledgements.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// GET /healthcheck
pub async fn healthcheck() -> &'static str {
    "Healthy"
}

/// Registration body. `host` defaults to the caller's address.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    pub port: u16,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub secondary_port: Option<u16>,
}

/// POST /register
///
/// Takes the raw request so the peer address can be read from its
/// extensions when the server runs with connect info.
pub async fn register(State(state): State<ApiState>, request: Request) -> impl IntoResponse {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return error_response(&format!("unreadable body: {e}"), StatusCode::BAD_REQUEST)
                .into_response();
        }
    };
    let req: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "rejected registration body");
            return error_response(&format!("invalid request body: {e}"), StatusCode::BAD_REQUEST)
                .into_response();
        }
    };

    let host = match req.host.filter(|h| !h.trim().is_empty()).or(peer) {
        Some(host) => host,
        None => {
            return error_response("host is required", StatusCode::BAD_REQUEST).into_response();
        }
    };

    match state
        .registry
        .register(&req.id, &host, req.port, req.secondary_port)
    {
        Ok(()) => (StatusCode::OK, "Worker registered").into_response(),
        Err(e) if e.is_validation() => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => {
            warn!(worker_id = %req.id, error = %e, "registration failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerHealth {
    pub address: String,
    pub is_healthy: bool,
}

/// GET /worker/health?address=host:port
pub async fn worker_health(
    State(state): State<ApiState>,
    Query(query): Query<HealthQuery>,
) -> impl IntoResponse {
    let Some(address) = query.address.filter(|a| !a.is_empty()) else {
        return error_response("address query parameter is required", StatusCode::BAD_REQUEST)
            .into_response();
    };

    match state.registry.get_worker_health_by_address(&address) {
        Some(is_healthy) => Json(WorkerHealth {
            address,
            is_healthy,
        })
        .into_response(),
        None => error_response("worker not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// GET /workers/healthy
pub async fn healthy_workers(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.registry.list_healthy())
}

/// GET /workers/{id}
pub async fn get_worker(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get_worker(&id) {
        Some(worker) => Json(worker).into_response(),
        None => error_response("worker not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// DELETE /workers/{id}
pub async fn remove_worker(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.registry.remove_worker(&id) {
        ApiResponse::ok("removed").into_response()
    } else {
        error_response("worker not found", StatusCode::NOT_FOUND).into_response()
    }
}

/// POST /workers/check
pub async fn check_workers(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.registry.check_all_workers().await)
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = warpreg_metrics::render_prometheus(&state.metrics);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
