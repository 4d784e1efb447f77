//! Storage abstraction for jobs, repositories and events.
//!
//! The traits here are the narrow, repository-style interface the import and
//! webhook paths consume. A relational backend implements them against its own
//! schema; [`MemoryStore`] implements all of them in-process.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`EventStore`] | Dedup probe, single/batch insert, listing |
//! | [`RepositoryStore`] | Upsert by `(user, external id)`, checkpoint writes |
//! | [`JobStore`] | Job lifecycle and progress |
//! | [`AccessTokenProvider`] | A user's linked GitHub access token |
//! | [`WebhookUserResolver`] | GitHub account id → internal user |
//!
//! Implementations must enforce uniqueness of `(user_id, external_id)` for
//! events and report a violation as [`StoreError::Duplicate`]. Callers treat
//! that as "already exists", never as a failure.

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    ErrorDetails, ExternalId, GitEvent, ImportJob, JobId, JobStatus, NewGitEvent, RepoMeta,
    Repository, RepositoryId, UserId,
};

pub use memory::MemoryStore;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(user_id, external_id)` uniqueness constraint was violated.
    #[error("event {external_id} already exists for user {user_id}")]
    Duplicate {
        user_id: UserId,
        external_id: ExternalId,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A status write that the job state machine does not allow.
    #[error("import job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// The backend could not serve the request. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// A job status change together with the error fields it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub error_details: Option<ErrorDetails>,
}

impl StatusUpdate {
    /// Starts a run. Existing error details are kept so the attempt count survives.
    pub fn in_progress() -> Self {
        Self {
            status: JobStatus::InProgress,
            error_message: None,
            error_details: None,
        }
    }

    /// Finishes a run successfully, clearing error fields.
    pub fn completed() -> Self {
        Self {
            status: JobStatus::Completed,
            error_message: None,
            error_details: None,
        }
    }

    /// Records a failed run.
    pub fn failed(message: impl Into<String>, details: ErrorDetails) -> Self {
        Self {
            status: JobStatus::Failed,
            error_message: Some(message.into()),
            error_details: Some(details),
        }
    }
}

/// Immutable activity events, unique per `(user_id, external_id)`.
pub trait EventStore: Send + Sync {
    /// Dedup probe.
    fn exists(
        &self,
        user_id: &UserId,
        external_id: &ExternalId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Inserts one event. Fails with [`StoreError::Duplicate`] if the key is taken.
    fn create(&self, event: NewGitEvent) -> impl Future<Output = Result<GitEvent, StoreError>> + Send;

    /// Inserts many events, skipping any whose key is already taken.
    ///
    /// Returns the number of events actually inserted.
    fn create_batch(
        &self,
        events: Vec<NewGitEvent>,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// All events of a user, most recent occurrence first.
    fn list_events(&self, user_id: &UserId) -> impl Future<Output = Result<Vec<GitEvent>, StoreError>> + Send;
}

/// Tracked repositories, unique per `(user_id, external_id)`.
pub trait RepositoryStore: Send + Sync {
    /// Inserts or refreshes a repository. The sync checkpoint is never touched.
    fn upsert_repository(
        &self,
        user_id: &UserId,
        meta: &RepoMeta,
    ) -> impl Future<Output = Result<Repository, StoreError>> + Send;

    /// Writes the sync checkpoint of one repository.
    fn set_last_synced(
        &self,
        id: &RepositoryId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// A user's repositories, most recently added first.
    fn list_repositories(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Repository>, StoreError>> + Send;
}

/// Import job records.
pub trait JobStore: Send + Sync {
    fn get_job(&self, id: &JobId) -> impl Future<Output = Result<Option<ImportJob>, StoreError>> + Send;

    /// Creates a pending job for `user_id`.
    fn create_job(&self, user_id: &UserId) -> impl Future<Output = Result<ImportJob, StoreError>> + Send;

    /// A user's jobs, newest first.
    fn list_jobs(&self, user_id: &UserId) -> impl Future<Output = Result<Vec<ImportJob>, StoreError>> + Send;

    /// Applies a status change.
    ///
    /// Sets `started_at` on `in_progress` and `completed_at` on `completed`
    /// or `failed`. Changes that [`JobStatus::can_transition_to`] rejects fail
    /// with [`StoreError::InvalidTransition`] and leave the job untouched.
    fn update_status(
        &self,
        id: &JobId,
        update: StatusUpdate,
    ) -> impl Future<Output = Result<ImportJob, StoreError>> + Send;

    /// Records progress and recomputes the percentage.
    fn update_progress(
        &self,
        id: &JobId,
        processed: u32,
        total: u32,
        current_repository: Option<String>,
    ) -> impl Future<Output = Result<ImportJob, StoreError>> + Send;
}

/// Looks up the GitHub access token linked to a user.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;
}

/// Maps a webhook sender to an internal user through the linked account.
pub trait WebhookUserResolver: Send + Sync {
    fn resolve_github_account(
        &self,
        github_account_id: u64,
    ) -> impl Future<Output = Result<Option<UserId>, StoreError>> + Send;
}

/// Everything the service needs from its backend.
pub trait Store:
    EventStore + RepositoryStore + JobStore + AccessTokenProvider + WebhookUserResolver + 'static
{
}

impl<T> Store for T where
    T: EventStore + RepositoryStore + JobStore + AccessTokenProvider + WebhookUserResolver + 'static
{
}
