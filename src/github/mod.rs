//! GitHub REST API access for the bulk import path.
//!
//! Key features:
//! - Per-run rate-limit tracking with pause-until-reset
//! - Exponential backoff with jitter for retry loops
//! - Distinguishes transient, permanent and unauthorized failures
//! - Paginated, privacy-reducing fetchers for repositories, commits, merged PRs and reviews

mod client;
mod error;
mod fetcher;
mod languages;
mod rate_limit;
mod retry;

pub use client::{
    ApiResponse, DEFAULT_API_BASE, GitHubConnector, GitHubTransport, OctocrabClient,
    OctocrabConnector,
};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use fetcher::{
    CommitMeta, PER_PAGE, PullRequestMeta, ReviewMeta, fetch_pull_request_reviews,
    fetch_repository_commits, fetch_repository_pull_requests, fetch_user_repositories, get_json,
};
pub use languages::{detect_languages, file_extension, language_for_extension};
pub use rate_limit::{RateLimitHeaders, RateLimitState, RateLimiter};
pub use retry::{BackoffConfig, RetryConfig, RetryResult, retry_with_backoff, wait_with_backoff};
