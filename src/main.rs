use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use git_activity_sync::config::Config;
use git_activity_sync::github::OctocrabConnector;
use git_activity_sync::server::{AppState, build_router};
use git_activity_sync::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "git_activity_sync=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load configuration")?;
    if config.github.webhook_secret.is_empty() {
        tracing::warn!("No webhook secret configured; all webhook deliveries will be rejected");
    }

    let store = Arc::new(MemoryStore::new());
    for account in &config.accounts {
        let token = account.access_token(|key| std::env::var(key).ok());
        if token.is_none() {
            tracing::warn!(user_id = %account.user_id, "No access token for linked account");
        }
        store
            .link_account(account.user_id(), account.github_id, token)
            .with_context(|| format!("failed to link account for {}", account.user_id))?;
    }

    let connector = Arc::new(OctocrabConnector::new(config.github.api_base.clone()));
    let app = build_router(AppState::new(store, connector, &config));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, accounts = config.accounts.len(), "listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    Ok(())
}
