//! Liveness endpoint.

use axum::http::StatusCode;

/// `GET /health`: 200 "OK" whenever the process is serving requests.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
