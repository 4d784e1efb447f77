//! Webhook handling for GitHub deliveries.
//!
//! This module provides:
//! - Signature verification for delivery bodies (HMAC-SHA256)
//! - Normalization of `push`, `pull_request` and `pull_request_review`
//!   payloads into privacy-reduced events
//! - Ingestion with in-process retry; a delivery that keeps failing is
//!   logged and dropped

mod events;
mod ingest;
mod normalizer;
pub mod signature;

pub use events::{NormalizeResult, NormalizedWebhookEvent, WebhookKind};
pub use ingest::{IngestError, IngestOutcome, WebhookIngestor};
pub use normalizer::{
    NormalizeError, normalize, normalize_pull_request, normalize_pull_request_review,
    normalize_push, sender_id,
};
pub use signature::{SIGNATURE_HEADER, parse_signature_header, sign_payload, verify_signature};
