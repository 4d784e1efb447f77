//! Import job records and their status state machine.
//!
//! ```text
//! pending ──┐
//!           ├──▶ in_progress ──▶ completed
//! failed ───┘                └─▶ failed
//! ```
//!
//! `failed` can re-enter `in_progress` while fewer than the configured
//! attempt ceiling ([`MAX_IMPORT_ATTEMPTS`] by default) have been recorded in
//! [`ErrorDetails`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{JobId, UserId};

/// Default number of runs a job may fail before it is permanently unretryable.
pub const MAX_IMPORT_ATTEMPTS: u32 = 3;

/// Status of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true if a run may start from this status.
    pub fn can_start(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed)
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending | JobStatus::Failed, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed | JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure bookkeeping persisted on a job after a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub attempts: u32,
    pub last_error: String,
}

/// One bulk backfill run for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: JobId,
    pub user_id: UserId,
    pub status: JobStatus,
    /// Derived from `processed_items` and `total_items`; see [`progress_percent`].
    pub progress: u8,
    /// Number of repositories in the run, unset until they have been listed.
    pub total_items: Option<u32>,
    pub processed_items: u32,
    /// `owner/name` of the repository currently being processed.
    pub current_repository: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<ErrorDetails>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    /// Creates a fresh pending job.
    pub fn new(id: JobId, user_id: UserId, now: DateTime<Utc>) -> Self {
        ImportJob {
            id,
            user_id,
            status: JobStatus::Pending,
            progress: 0,
            total_items: None,
            processed_items: 0,
            current_repository: None,
            error_message: None,
            error_details: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of failed runs recorded so far.
    pub fn attempts(&self) -> u32 {
        self.error_details.as_ref().map_or(0, |d| d.attempts)
    }

    /// Returns true once `max_attempts` failed runs have been recorded.
    pub fn attempts_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts() >= max_attempts
    }

    /// Whether a user-initiated retry should be accepted.
    pub fn can_retry(&self, max_attempts: u32) -> bool {
        self.status == JobStatus::Failed && !self.attempts_exhausted(max_attempts)
    }
}

/// `round(processed / total * 100)`, clamped to 100; 0 when `total` is 0.
pub fn progress_percent(processed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(processed) / f64::from(total) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
