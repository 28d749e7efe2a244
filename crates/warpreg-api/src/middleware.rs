//! Request middleware: request ids, API-key auth, request logging.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ApiState;
use crate::handlers::error_response;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request id, stored in request extensions for handlers.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reuse the caller's `X-Request-ID` or mint a UUID v4, and echo it back.
pub async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reject requests whose `X-API-Key` does not match the configured secret.
pub async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if key == &*state.api_key => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "rejected request with invalid API key");
            error_response("invalid API key", StatusCode::UNAUTHORIZED).into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "rejected request without API key");
            error_response("missing API key", StatusCode::UNAUTHORIZED).into_response()
        }
    }
}

/// Endpoint label for requests that no route matched.
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Log every request and count it in the registry metrics.
pub async fn track_requests(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    // Label by route template so per-worker paths share one series. Paths
    // that match no route share a single fixed label.
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();
    state
        .metrics
        .record_request(&method, &endpoint, status, latency);
    debug!(
        %method,
        %path,
        status,
        latency_ms = latency.as_millis() as u64,
        %request_id,
        "request served"
    );
    response
}
