//! Bulk history import.
//!
//! One [`ImportOrchestrator::run`] backfills a user's commits, merged pull
//! requests and reviews from GitHub into the event store, resuming each
//! repository from its sync checkpoint. Job state is authoritative: a failed
//! run is always recorded on the job before the error is returned.

mod error;
mod orchestrator;

#[cfg(test)]
mod tests;

pub use error::ImportError;
pub use orchestrator::{
    DEFAULT_BATCH_SIZE, ImportOrchestrator, ImportSettings, ImportSummary, into_batches,
    run_import_job,
};
