//! Import job failures.

use thiserror::Error;

use crate::github::GitHubApiError;
use crate::store::StoreError;
use crate::types::{JobId, JobStatus};

/// Why an import run did not complete.
///
/// The first four variants are raised before a run starts (or, for
/// `Authentication`, as soon as the token is known to be unusable) and will
/// fail again if retried unchanged.
#[derive(Debug, Error)]
pub enum ImportError {
    /// No usable access token for the job's user.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("import job {0} not found")]
    JobNotFound(JobId),

    #[error("import job {job_id} has status {status}, expected pending or failed")]
    InvalidStatus { job_id: JobId, status: JobStatus },

    #[error("import job {job_id} has exceeded maximum retry attempts ({max_attempts})")]
    RetriesExhausted { job_id: JobId, max_attempts: u32 },

    #[error(transparent)]
    GitHub(GitHubApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    /// Whether running the job again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ImportError::GitHub(_) | ImportError::Store(_))
    }
}

impl From<GitHubApiError> for ImportError {
    fn from(err: GitHubApiError) -> Self {
        if err.is_unauthorized() {
            ImportError::Authentication(err.message)
        } else {
            ImportError::GitHub(err)
        }
    }
}
