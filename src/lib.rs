//! Git Activity Sync - ingests GitHub activity into privacy-reduced events.
//!
//! Two paths feed one event store: a resumable bulk import that backfills a
//! user's commits, merged pull requests and reviews through the REST API, and
//! incremental webhook ingestion. Both reduce raw activity to counts and
//! lengths, and both rely on the `(user, external id)` uniqueness constraint
//! to deduplicate against each other.

pub mod config;
pub mod github;
pub mod import;
pub mod server;
pub mod stats;
pub mod store;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
