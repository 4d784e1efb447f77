//! The bulk backfill state machine.
//!
//! [`ImportOrchestrator::run`] drives one job through
//! `pending|failed → in_progress → completed|failed`:
//!
//! 1. Load the job; reject missing jobs, jobs in a non-startable status and
//!    jobs that have used up their attempts, without touching state.
//! 2. Mark it `in_progress`, list and upsert the user's repositories, publish
//!    the total.
//! 3. Per repository, in listing order: fetch commits since the checkpoint,
//!    store new ones in batches; fetch merged PRs and their reviews, store new
//!    ones in batches; then advance the checkpoint and the progress counter.
//! 4. Mark it `completed`, or on any error record `failed` with the incremented
//!    attempt count and return the error.
//!
//! Runs are sequential within a job. Each run owns its [`RateLimiter`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use super::error::ImportError;
use crate::github::{
    CommitMeta, GitHubConnector, GitHubTransport, PullRequestMeta, RateLimiter, ReviewMeta,
    fetch_pull_request_reviews, fetch_repository_commits, fetch_repository_pull_requests,
    fetch_user_repositories,
};
use crate::store::{AccessTokenProvider, EventStore, JobStore, RepositoryStore, StatusUpdate};
use crate::types::{
    ErrorDetails, EventMetadata, EventType, ImportJob, JobId, MAX_IMPORT_ATTEMPTS, NewGitEvent,
    Repository,
};

/// Events per `create_batch` call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Tunables of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub max_attempts: u32,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: MAX_IMPORT_ATTEMPTS,
        }
    }
}

/// Counts reported by a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub repositories: u32,
    pub events_stored: usize,
    pub events_skipped: usize,
}

impl ImportSummary {
    fn add(&mut self, other: RepositorySummary) {
        self.events_stored += other.stored;
        self.events_skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RepositorySummary {
    stored: usize,
    skipped: usize,
}

/// Splits `items` into consecutive batches of at most `size` items.
pub fn into_batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        batches.push(items.by_ref().take(size).collect());
    }
    batches
}

/// Runs import jobs against a store and GitHub.
pub struct ImportOrchestrator<S, C> {
    store: Arc<S>,
    connector: Arc<C>,
    settings: ImportSettings,
}

impl<S, C> Clone for ImportOrchestrator<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            connector: Arc::clone(&self.connector),
            settings: self.settings,
        }
    }
}

impl<S, C> ImportOrchestrator<S, C>
where
    S: EventStore + RepositoryStore + JobStore + AccessTokenProvider,
    C: GitHubConnector,
{
    pub fn new(store: Arc<S>, connector: Arc<C>, settings: ImportSettings) -> Self {
        Self {
            store,
            connector,
            settings,
        }
    }

    pub fn settings(&self) -> ImportSettings {
        self.settings
    }

    /// Runs one job to completion or failure.
    ///
    /// Failures after the job entered `in_progress`, including a failed
    /// `completed` write, are recorded on the job before being returned.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn run(&self, job_id: &JobId) -> Result<ImportSummary, ImportError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ImportError::JobNotFound(job_id.clone()))?;

        if !job.status.can_start() {
            return Err(ImportError::InvalidStatus {
                job_id: job.id,
                status: job.status,
            });
        }

        let previous_attempts = job.attempts();
        if job.attempts_exhausted(self.settings.max_attempts) {
            return Err(ImportError::RetriesExhausted {
                job_id: job.id,
                max_attempts: self.settings.max_attempts,
            });
        }

        // Nothing to record if this fails: the job is still pending or failed.
        self.store
            .update_status(&job.id, StatusUpdate::in_progress())
            .await?;
        info!(
            user_id = %job.user_id,
            attempt = previous_attempts + 1,
            "Starting import job"
        );

        match self.execute(&job).await {
            Ok(summary) => {
                info!(
                    repositories = summary.repositories,
                    events_stored = summary.events_stored,
                    events_skipped = summary.events_skipped,
                    "Import job completed"
                );
                Ok(summary)
            }
            Err(e) => {
                let message = e.to_string();
                let details = ErrorDetails {
                    attempts: previous_attempts + 1,
                    last_error: message.clone(),
                };
                error!(error = %message, attempts = details.attempts, "Import job failed");

                if let Err(store_err) = self
                    .store
                    .update_status(&job.id, StatusUpdate::failed(message, details))
                    .await
                {
                    error!(error = %store_err, "Failed to record import job failure");
                }
                Err(e)
            }
        }
    }

    /// Everything a run does once the job is `in_progress`, ending with the
    /// `completed` write.
    async fn execute(&self, job: &ImportJob) -> Result<ImportSummary, ImportError> {
        let token = self
            .store
            .access_token(&job.user_id)
            .await?
            .ok_or_else(|| {
                ImportError::Authentication(format!(
                    "no GitHub account linked for user {}",
                    job.user_id
                ))
            })?;
        let github = self.connector.connect(&token)?;
        let mut limiter = RateLimiter::new();

        let listed = fetch_user_repositories(&github, &mut limiter).await?;
        let mut repositories = Vec::with_capacity(listed.len());
        for meta in &listed {
            repositories.push(self.store.upsert_repository(&job.user_id, meta).await?);
        }

        let total = repositories.len() as u32;
        self.store.update_progress(&job.id, 0, total, None).await?;

        let mut summary = ImportSummary::default();
        for (processed, repository) in (0u32..).zip(&repositories) {
            self.store
                .update_progress(&job.id, processed, total, Some(repository.full_name()))
                .await?;

            let repo_summary = self
                .sync_repository(&github, &mut limiter, job, repository)
                .await?;
            summary.add(repo_summary);

            self.store
                .update_progress(&job.id, processed + 1, total, None)
                .await?;
        }
        summary.repositories = total;

        self.store
            .update_status(&job.id, StatusUpdate::completed())
            .await?;
        Ok(summary)
    }

    /// Stores everything new in one repository, then advances its checkpoint.
    #[instrument(skip_all, fields(repo = %repository.full_name()))]
    async fn sync_repository<T: GitHubTransport>(
        &self,
        github: &T,
        limiter: &mut RateLimiter,
        job: &ImportJob,
        repository: &Repository,
    ) -> Result<RepositorySummary, ImportError> {
        let owner = repository.owner_login.as_str();
        let name = repository.name.as_str();
        let since = repository.last_synced_at;
        let mut summary = RepositorySummary::default();

        let commits = fetch_repository_commits(github, limiter, owner, name, since).await?;
        let mut commit_events = Vec::new();
        for commit in commits {
            let event = commit_event(job, repository, commit);
            if self.is_known(&event).await? {
                summary.skipped += 1;
                continue;
            }
            commit_events.push(event);
        }
        summary.stored += self.insert_batches(commit_events).await?;

        let pulls = fetch_repository_pull_requests(github, limiter, owner, name, since).await?;
        let mut pull_events = Vec::new();
        for pull in pulls {
            let number = pull.number;
            let event = pull_request_event(job, repository, pull);
            if self.is_known(&event).await? {
                summary.skipped += 1;
            } else {
                pull_events.push(event);
            }

            let reviews = fetch_pull_request_reviews(github, limiter, owner, name, number).await?;
            for review in reviews {
                let event = review_event(job, repository, review);
                if self.is_known(&event).await? {
                    summary.skipped += 1;
                    continue;
                }
                pull_events.push(event);
            }
        }
        summary.stored += self.insert_batches(pull_events).await?;

        self.store
            .set_last_synced(&repository.id, Utc::now())
            .await?;

        info!(
            stored = summary.stored,
            skipped = summary.skipped,
            "Repository synced"
        );
        Ok(summary)
    }

    async fn is_known(&self, event: &NewGitEvent) -> Result<bool, ImportError> {
        let exists = self
            .store
            .exists(&event.user_id, &event.external_id)
            .await?;
        if exists {
            debug!(external_id = %event.external_id, event_type = %event.event_type, "Skipping known event");
        }
        Ok(exists)
    }

    async fn insert_batches(&self, events: Vec<NewGitEvent>) -> Result<usize, ImportError> {
        let mut inserted = 0;
        for batch in into_batches(events, self.settings.batch_size) {
            inserted += self.store.create_batch(batch).await?;
        }
        Ok(inserted)
    }
}

/// Runs a job and logs the outcome. For fire-and-forget callers.
pub async fn run_import_job<S, C>(orchestrator: &ImportOrchestrator<S, C>, job_id: &JobId)
where
    S: EventStore + RepositoryStore + JobStore + AccessTokenProvider,
    C: GitHubConnector,
{
    if let Err(e) = orchestrator.run(job_id).await {
        error!(job_id = %job_id, error = %e, retryable = e.is_retryable(), "Import job did not complete");
    }
}

fn commit_event(job: &ImportJob, repository: &Repository, commit: CommitMeta) -> NewGitEvent {
    NewGitEvent {
        user_id: job.user_id.clone(),
        repository_id: repository.id.clone(),
        import_job_id: Some(job.id.clone()),
        external_id: commit.sha,
        event_type: EventType::Commit,
        occurred_at: commit.date,
        lines_added: commit.lines_added,
        lines_removed: commit.lines_removed,
        files_changed: commit.files_changed,
        languages: commit.languages,
        metadata: EventMetadata::commit(commit.message_length),
    }
}

fn pull_request_event(job: &ImportJob, repository: &Repository, pull: PullRequestMeta) -> NewGitEvent {
    NewGitEvent {
        user_id: job.user_id.clone(),
        repository_id: repository.id.clone(),
        import_job_id: Some(job.id.clone()),
        external_id: pull.external_id,
        event_type: EventType::PullRequest,
        occurred_at: pull.merged_at,
        lines_added: pull.lines_added,
        lines_removed: pull.lines_removed,
        files_changed: pull.files_changed,
        languages: Vec::new(),
        metadata: EventMetadata::pull_request(pull.title_length, None),
    }
}

fn review_event(job: &ImportJob, repository: &Repository, review: ReviewMeta) -> NewGitEvent {
    NewGitEvent {
        user_id: job.user_id.clone(),
        repository_id: repository.id.clone(),
        import_job_id: Some(job.id.clone()),
        external_id: review.external_id,
        event_type: EventType::Review,
        occurred_at: review.submitted_at,
        lines_added: 0,
        lines_removed: 0,
        files_changed: 0,
        languages: Vec::new(),
        metadata: EventMetadata::review(review.state),
    }
}
