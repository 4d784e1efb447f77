//! Core domain types for activity ingestion.
//!
//! This module contains the records shared by the bulk import path and the
//! webhook path, designed to encode invariants via the type system.

pub mod event;
pub mod ids;
pub mod job;
pub mod repository;

// Re-export commonly used types at the module level
pub use event::{
    EventMetadata, EventType, GitEvent, LanguageCount, NewGitEvent, PrAction, ReviewState,
    text_length,
};
pub use ids::{DeliveryId, ExternalId, JobId, PrNumber, RepositoryId, UserId};
pub use job::{ErrorDetails, ImportJob, JobStatus, MAX_IMPORT_ATTEMPTS, progress_percent};
pub use repository::{RepoMeta, Repository};
