//! Incremental ingestion of webhook deliveries.
//!
//! A delivery is attributed to a user through the sender's linked GitHub
//! account, normalized, and stored event by event. Deliveries from unknown or
//! unlinked accounts are not errors; they are simply not ours to record.
//!
//! [`WebhookIngestor::ingest_webhook_event`] is the outer boundary. It retries
//! a store failure in-process with exponential backoff and, once attempts are
//! exhausted, logs the failure and drops the delivery. A payload that cannot be
//! normalized is dropped after the first attempt. GitHub has its own
//! redelivery policy, so nothing is propagated back to the sender.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::github::{RetryConfig, RetryResult, retry_with_backoff};
use crate::store::{Store, StoreError};
use crate::types::DeliveryId;

use super::events::WebhookKind;
use super::normalizer::{NormalizeError, normalize, sender_id};

/// Why a single ingestion attempt failed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid webhook payload: {0}")]
    Payload(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Store failures may clear up; a malformed payload stays malformed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, IngestError::Store(_))
    }
}

/// What one ingestion attempt did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Events were normalized; `stored` were new, `skipped` already existed.
    Stored { stored: usize, skipped: usize },
    /// The payload names no sender.
    NoSender,
    /// The sender is not linked to any user.
    UnknownSender,
    /// The event kind carries no activity we record.
    Unsupported,
}

/// Stores webhook-sourced events for linked users.
pub struct WebhookIngestor<S> {
    store: Arc<S>,
    retry: RetryConfig,
}

impl<S> Clone for WebhookIngestor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}

impl<S: Store> WebhookIngestor<S> {
    pub fn new(store: Arc<S>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// One ingestion attempt, with no retry.
    ///
    /// Each event is probed before insertion. A uniqueness violation on
    /// insert (a concurrent delivery or import won the race) also counts as
    /// already stored.
    pub async fn ingest(&self, kind: WebhookKind, payload: &Value) -> Result<IngestOutcome, IngestError> {
        let Some(sender) = sender_id(payload) else {
            return Ok(IngestOutcome::NoSender);
        };

        let Some(user_id) = self.store.resolve_github_account(sender).await? else {
            debug!(sender, "Webhook sender is not linked to a user, ignoring");
            return Ok(IngestOutcome::UnknownSender);
        };

        let Some(normalized) = normalize(kind, payload)? else {
            return Ok(IngestOutcome::Unsupported);
        };

        let repository = self
            .store
            .upsert_repository(&user_id, &normalized.repo_meta)
            .await?;

        let mut stored = 0;
        let mut skipped = 0;
        for event in normalized.events {
            if self.store.exists(&user_id, &event.external_id).await? {
                debug!(external_id = %event.external_id, "Event already stored, skipping");
                skipped += 1;
                continue;
            }

            match self
                .store
                .create(event.into_new_event(user_id.clone(), repository.id.clone()))
                .await
            {
                Ok(_) => stored += 1,
                Err(e) if e.is_duplicate() => skipped += 1,
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            user_id = %user_id,
            repo = %repository.full_name(),
            stored,
            skipped,
            "Webhook events ingested"
        );
        Ok(IngestOutcome::Stored { stored, skipped })
    }

    /// Ingests one delivery, retrying store failures with backoff.
    ///
    /// Returns `None` when the delivery was dropped, either because every
    /// attempt failed or because the payload is malformed. The failure has
    /// been logged.
    #[instrument(skip_all, fields(delivery_id = %delivery_id, event_type = %event_type))]
    pub async fn ingest_webhook_event(
        &self,
        event_type: &str,
        delivery_id: &DeliveryId,
        payload: &Value,
    ) -> Option<IngestOutcome> {
        let kind = WebhookKind::from_event_header(event_type);

        let result =
            retry_with_backoff(self.retry, IngestError::is_retriable, |_| self.ingest(kind, payload)).await;
        match result {
            RetryResult::Success(outcome) => Some(outcome),
            RetryResult::PermanentError(e) => {
                error!(error = %e, "Webhook delivery dropped");
                None
            }
            RetryResult::ExhaustedRetries { last_error, attempts } => {
                error!(
                    attempts,
                    error = %last_error,
                    "Webhook delivery dropped after exhausting retries"
                );
                None
            }
        }
    }
}
