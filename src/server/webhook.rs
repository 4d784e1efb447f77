//! Webhook endpoint handler.
//!
//! Verifies the delivery signature, acknowledges immediately, and hands the
//! payload to a background ingestion task. Ingestion failures are never
//! reported back to GitHub.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::github::GitHubConnector;
use crate::store::Store;
use crate::types::DeliveryId;
use crate::webhooks::{SIGNATURE_HEADER, WebhookKind, verify_signature};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";

/// Errors that reject a delivery before it is acknowledged.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 200 `{"received":true}`: accepted, ingestion runs in the background
/// - 200 `{"received":true,"ignored":true}`: event kind not handled
/// - 400 Bad Request: body is not JSON
/// - 401 Unauthorized: bad, missing, or unverifiable signature
pub async fn webhook_handler<S, C>(
    State(app_state): State<AppState<S, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let event_type = header_or_empty(&headers, HEADER_EVENT);
    let delivery_id = DeliveryId::new(header_or_empty(&headers, HEADER_DELIVERY));
    let signature = header_or_empty(&headers, SIGNATURE_HEADER);

    // Verify before touching the body.
    if !verify_signature(&body, &signature, app_state.webhook_secret()) {
        warn!(delivery_id = %delivery_id, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    if !WebhookKind::from_event_header(&event_type).is_supported() {
        debug!(delivery_id = %delivery_id, event_type = %event_type, "Ignoring webhook event");
        return Ok(Json(json!({ "received": true, "ignored": true })));
    }

    let payload: Value = serde_json::from_slice(&body)?;

    debug!(delivery_id = %delivery_id, event_type = %event_type, "Accepted webhook");

    let ingestor = app_state.ingestor().clone();
    tokio::spawn(async move {
        ingestor
            .ingest_webhook_event(&event_type, &delivery_id, &payload)
            .await;
    });

    Ok(Json(json!({ "received": true })))
}

/// A header value, or the empty string when absent or not UTF-8.
fn header_or_empty(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
