//! HTTP server for the activity sync service.
//!
//! This module implements the HTTP surface that:
//! - Accepts webhooks from GitHub, validates signatures, and ingests them in
//!   the background
//! - Triggers, lists, inspects and retries import jobs
//! - Reports per-user activity stats
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /webhooks/github` - Accepts GitHub webhook deliveries
//! - `POST /users/{user_id}/imports` - Creates and starts an import job (201)
//! - `GET /users/{user_id}/imports` - Lists a user's import jobs
//! - `GET /users/{user_id}/stats` - Aggregate activity stats
//! - `GET /imports/{id}` - One import job
//! - `POST /imports/{id}/retry` - Restarts a failed job (202)
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod health;
pub mod imports;
pub mod webhook;

pub use health::health_handler;
pub use imports::{ApiError, create_import, get_import, list_imports, retry_import, user_stats};
pub use webhook::{WebhookError, webhook_handler};

use crate::config::Config;
use crate::github::GitHubConnector;
use crate::import::ImportOrchestrator;
use crate::store::Store;
use crate::webhooks::WebhookIngestor;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
pub struct AppState<S, C> {
    inner: Arc<AppStateInner<S, C>>,
}

struct AppStateInner<S, C> {
    store: Arc<S>,
    orchestrator: ImportOrchestrator<S, C>,
    ingestor: WebhookIngestor<S>,
    /// Webhook secret for HMAC-SHA256 signature verification.
    webhook_secret: Vec<u8>,
}

impl<S, C> Clone for AppState<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C> AppState<S, C>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    /// Wires the orchestrator and ingestor to one store.
    pub fn new(store: Arc<S>, connector: Arc<C>, config: &Config) -> Self {
        let orchestrator =
            ImportOrchestrator::new(Arc::clone(&store), connector, config.import_settings());
        let ingestor = WebhookIngestor::new(Arc::clone(&store), config.webhook_retry());
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                orchestrator,
                ingestor,
                webhook_secret: config.github.webhook_secret.clone().into_bytes(),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn orchestrator(&self) -> &ImportOrchestrator<S, C> {
        &self.inner.orchestrator
    }

    pub fn ingestor(&self) -> &WebhookIngestor<S> {
        &self.inner.ingestor
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<S, C>(app_state: AppState<S, C>) -> axum::Router
where
    S: Store,
    C: GitHubConnector + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhooks/github", post(webhook_handler::<S, C>))
        .route(
            "/users/{user_id}/imports",
            post(create_import::<S, C>).get(list_imports::<S, C>),
        )
        .route("/users/{user_id}/stats", get(user_stats::<S, C>))
        .route("/imports/{id}", get(get_import::<S, C>))
        .route("/imports/{id}/retry", post(retry_import::<S, C>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
