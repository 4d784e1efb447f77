//! Import job endpoints and per-user stats.
//!
//! Runs are started in the background; the trigger endpoints return as soon
//! as the job record exists. Progress and failures are observed by polling
//! the job.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use super::AppState;
use crate::github::GitHubConnector;
use crate::import::run_import_job;
use crate::stats::{self, UserStats};
use crate::store::{JobStore, Store, StoreError};
use crate::types::{ImportJob, JobId, JobStatus, UserId};

/// Errors returned by the import endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("import job not found: {0}")]
    NotFound(JobId),

    /// The request is well-formed but not allowed in the job's current state.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = json!({ "error": { "code": code, "message": self.to_string() } });
        (status, Json(body)).into_response()
    }
}

fn spawn_run<S, C>(app_state: &AppState<S, C>, job_id: JobId)
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let orchestrator = app_state.orchestrator().clone();
    tokio::spawn(async move {
        run_import_job(&orchestrator, &job_id).await;
    });
}

/// `POST /users/{user_id}/imports`: creates a pending job and starts it.
pub async fn create_import<S, C>(
    State(app_state): State<AppState<S, C>>,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<ImportJob>), ApiError>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let job = app_state.store().create_job(&UserId::new(user_id)).await?;
    info!(job_id = %job.id, user_id = %job.user_id, "Import job created");

    spawn_run(&app_state, job.id.clone());
    Ok((StatusCode::CREATED, Json(job)))
}

/// `GET /users/{user_id}/imports`: the user's jobs, newest first.
pub async fn list_imports<S, C>(
    State(app_state): State<AppState<S, C>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ImportJob>>, ApiError>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let jobs = app_state.store().list_jobs(&UserId::new(user_id)).await?;
    Ok(Json(jobs))
}

/// `GET /imports/{id}`
pub async fn get_import<S, C>(
    State(app_state): State<AppState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<ImportJob>, ApiError>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let job_id = JobId::new(id);
    let job = app_state
        .store()
        .get_job(&job_id)
        .await?
        .ok_or(ApiError::NotFound(job_id))?;
    Ok(Json(job))
}

/// `POST /imports/{id}/retry`: restarts a failed job with attempts left.
pub async fn retry_import<S, C>(
    State(app_state): State<AppState<S, C>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let job_id = JobId::new(id);
    let job = app_state
        .store()
        .get_job(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(job_id.clone()))?;

    if job.status != JobStatus::Failed {
        return Err(ApiError::Validation(
            "only failed import jobs can be retried".to_string(),
        ));
    }

    let max_attempts = app_state.orchestrator().settings().max_attempts;
    if !job.can_retry(max_attempts) {
        warn!(job_id = %job_id, attempts = job.attempts(), "Retry refused, attempts exhausted");
        return Err(ApiError::Validation(format!(
            "import job has exceeded maximum retry attempts ({max_attempts})"
        )));
    }

    info!(job_id = %job_id, attempts = job.attempts(), "Retrying import job");
    spawn_run(&app_state, job_id.clone());
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": job_id, "status": "retrying" })),
    ))
}

/// `GET /users/{user_id}/stats`
pub async fn user_stats<S, C>(
    State(app_state): State<AppState<S, C>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, ApiError>
where
    S: Store,
    C: GitHubConnector + 'static,
{
    let stats = stats::compute(app_state.store(), &UserId::new(user_id)).await?;
    Ok(Json(stats))
}
