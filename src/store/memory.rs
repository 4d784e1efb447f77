//! In-memory [`Store`](super::Store) implementation.
//!
//! Keeps every table in one `HashMap`/`Vec` set behind a `std::sync::Mutex`.
//! No lock is held across an `.await`. Uniqueness constraints are enforced the
//! way a relational backend's unique indexes would: a second event for the same
//! `(user_id, external_id)` is rejected with [`StoreError::Duplicate`].

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    AccessTokenProvider, EventStore, JobStore, RepositoryStore, StatusUpdate, StoreError,
    WebhookUserResolver,
};
use crate::types::{
    ExternalId, GitEvent, ImportJob, JobId, JobStatus, NewGitEvent, RepoMeta, Repository,
    RepositoryId, UserId, progress_percent,
};

/// A user's linked GitHub account.
#[derive(Debug, Clone)]
struct LinkedAccount {
    github_account_id: u64,
    access_token: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    events: Vec<GitEvent>,
    event_keys: HashSet<(UserId, ExternalId)>,
    repositories: HashMap<RepositoryId, Repository>,
    jobs: HashMap<JobId, ImportJob>,
    accounts: HashMap<UserId, LinkedAccount>,
    /// Number of upcoming event writes that fail with `Unavailable`.
    #[cfg(test)]
    failing_event_writes: u32,
    /// A status that the next `update_status` to it fails to write.
    #[cfg(test)]
    failing_status_write: Option<JobStatus>,
    /// Sizes of every `create_batch` call, in call order.
    #[cfg(test)]
    batch_sizes: Vec<usize>,
}

/// In-memory store for the service binary and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn job_not_found(id: &JobId) -> StoreError {
    StoreError::NotFound {
        entity: "import job",
        id: id.to_string(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Links a GitHub account (and optionally its access token) to a user.
    pub fn link_account(
        &self,
        user_id: UserId,
        github_account_id: u64,
        access_token: Option<String>,
    ) -> Result<(), StoreError> {
        self.lock()?.accounts.insert(
            user_id,
            LinkedAccount {
                github_account_id,
                access_token,
            },
        );
        Ok(())
    }

    /// Makes the next `count` event writes fail as if the backend were down.
    #[cfg(test)]
    pub fn fail_next_event_writes(&self, count: u32) {
        self.tables.lock().unwrap().failing_event_writes = count;
    }

    /// Makes the next write of `status` to any job fail as if the backend were down.
    #[cfg(test)]
    pub fn fail_next_status_write(&self, status: JobStatus) {
        self.tables.lock().unwrap().failing_status_write = Some(status);
    }

    /// Sizes of every `create_batch` call so far.
    #[cfg(test)]
    pub fn recorded_batch_sizes(&self) -> Vec<usize> {
        self.tables.lock().unwrap().batch_sizes.clone()
    }

    /// Overwrites a stored job as-is.
    #[cfg(test)]
    pub fn put_job(&self, job: ImportJob) {
        self.tables.lock().unwrap().jobs.insert(job.id.clone(), job);
    }
}

impl Tables {
    #[cfg(test)]
    fn take_injected_failure(&mut self) -> Result<(), StoreError> {
        if self.failing_event_writes > 0 {
            self.failing_event_writes -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn take_injected_failure(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    #[cfg(test)]
    fn take_injected_status_failure(&mut self, status: JobStatus) -> Result<(), StoreError> {
        if self.failing_status_write == Some(status) {
            self.failing_status_write = None;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn take_injected_status_failure(&mut self, _status: JobStatus) -> Result<(), StoreError> {
        Ok(())
    }

    /// Inserts an event if its key is free. Returns `None` on a duplicate.
    fn insert_event(&mut self, event: NewGitEvent, now: DateTime<Utc>) -> Option<GitEvent> {
        let key = (event.user_id.clone(), event.external_id.clone());
        if !self.event_keys.insert(key) {
            return None;
        }
        let stored = GitEvent::from_new(new_id(), event, now);
        self.events.push(stored.clone());
        Some(stored)
    }

    fn job_mut(&mut self, id: &JobId) -> Result<&mut ImportJob, StoreError> {
        self.jobs.get_mut(id).ok_or_else(|| job_not_found(id))
    }
}

impl EventStore for MemoryStore {
    async fn exists(&self, user_id: &UserId, external_id: &ExternalId) -> Result<bool, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .event_keys
            .contains(&(user_id.clone(), external_id.clone())))
    }

    async fn create(&self, event: NewGitEvent) -> Result<GitEvent, StoreError> {
        let mut tables = self.lock()?;
        tables.take_injected_failure()?;

        let user_id = event.user_id.clone();
        let external_id = event.external_id.clone();
        tables
            .insert_event(event, Utc::now())
            .ok_or(StoreError::Duplicate {
                user_id,
                external_id,
            })
    }

    async fn create_batch(&self, events: Vec<NewGitEvent>) -> Result<usize, StoreError> {
        let mut tables = self.lock()?;
        tables.take_injected_failure()?;
        #[cfg(test)]
        tables.batch_sizes.push(events.len());

        let now = Utc::now();
        let inserted = events
            .into_iter()
            .filter_map(|event| tables.insert_event(event, now))
            .count();
        Ok(inserted)
    }

    async fn list_events(&self, user_id: &UserId) -> Result<Vec<GitEvent>, StoreError> {
        let tables = self.lock()?;
        let mut events: Vec<GitEvent> = tables
            .events
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(events)
    }
}

impl RepositoryStore for MemoryStore {
    async fn upsert_repository(&self, user_id: &UserId, meta: &RepoMeta) -> Result<Repository, StoreError> {
        let mut tables = self.lock()?;
        let now = Utc::now();

        if let Some(existing) = tables
            .repositories
            .values_mut()
            .find(|r| &r.user_id == user_id && r.external_id == meta.external_id)
        {
            existing.apply_meta(meta, now);
            return Ok(existing.clone());
        }

        let repository = Repository {
            id: RepositoryId::new(new_id()),
            user_id: user_id.clone(),
            external_id: meta.external_id.clone(),
            owner_login: meta.owner_login.clone(),
            name: meta.name.clone(),
            is_private: meta.is_private,
            default_branch: meta.default_branch.clone(),
            primary_language: meta.primary_language.clone(),
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        tables
            .repositories
            .insert(repository.id.clone(), repository.clone());
        Ok(repository)
    }

    async fn set_last_synced(&self, id: &RepositoryId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let repository = tables
            .repositories
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "repository",
                id: id.to_string(),
            })?;
        repository.last_synced_at = Some(at);
        repository.updated_at = Utc::now();
        Ok(())
    }

    async fn list_repositories(&self, user_id: &UserId) -> Result<Vec<Repository>, StoreError> {
        let tables = self.lock()?;
        let mut repositories: Vec<Repository> = tables
            .repositories
            .values()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        repositories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(repositories)
    }
}

impl JobStore for MemoryStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    async fn create_job(&self, user_id: &UserId) -> Result<ImportJob, StoreError> {
        let job = ImportJob::new(JobId::new(new_id()), user_id.clone(), Utc::now());
        self.lock()?.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn list_jobs(&self, user_id: &UserId) -> Result<Vec<ImportJob>, StoreError> {
        let tables = self.lock()?;
        let mut jobs: Vec<ImportJob> = tables
            .jobs
            .values()
            .filter(|j| &j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn update_status(&self, id: &JobId, update: StatusUpdate) -> Result<ImportJob, StoreError> {
        let mut tables = self.lock()?;
        tables.take_injected_status_failure(update.status)?;
        let job = tables.job_mut(id)?;
        if !job.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: job.status,
                to: update.status,
            });
        }
        let now = Utc::now();

        job.status = update.status;
        job.error_message = update.error_message;
        match update.status {
            JobStatus::InProgress => {
                job.started_at = Some(now);
                job.completed_at = None;
            }
            JobStatus::Completed => {
                job.error_details = None;
                job.completed_at = Some(now);
            }
            JobStatus::Failed => {
                job.error_details = update.error_details;
                job.completed_at = Some(now);
            }
            JobStatus::Pending => {}
        }
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn update_progress(
        &self,
        id: &JobId,
        processed: u32,
        total: u32,
        current_repository: Option<String>,
    ) -> Result<ImportJob, StoreError> {
        let mut tables = self.lock()?;
        let job = tables.job_mut(id)?;

        job.processed_items = processed;
        job.total_items = Some(total);
        job.progress = progress_percent(processed, total);
        if current_repository.is_some() {
            job.current_repository = current_repository;
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

impl AccessTokenProvider for MemoryStore {
    async fn access_token(&self, user_id: &UserId) -> Result<Option<String>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .accounts
            .get(user_id)
            .and_then(|a| a.access_token.clone()))
    }
}

impl WebhookUserResolver for MemoryStore {
    async fn resolve_github_account(&self, github_account_id: u64) -> Result<Option<UserId>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .accounts
            .iter()
            .find(|(_, account)| {
                account.github_account_id == github_account_id && account.access_token.is_some()
            })
            .map(|(user_id, _)| user_id.clone()))
    }
}
