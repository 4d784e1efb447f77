//! Failures talking to the GitHub REST API.
//!
//! Every failure is sorted into one of three buckets so that callers can
//! decide between backing off and giving up. The import orchestrator retries
//! [`GitHubErrorKind::Transient`] failures, fails the job immediately on
//! [`GitHubErrorKind::Permanent`] ones, and reports
//! [`GitHubErrorKind::Unauthorized`] as an authentication problem so the user
//! knows to re-link their account.

use std::fmt;
use thiserror::Error;

use super::rate_limit::RateLimitHeaders;

/// Phrases GitHub uses in 403 bodies when a primary or secondary limit trips.
const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "api rate", "secondary rate", "abuse detection"];

/// Phrases that show up in hyper/reqwest errors for connectivity problems.
const NETWORK_PHRASES: &[&str] = &["timeout", "timed out", "connection", "network", "dns"];

/// How a failed request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Worth another attempt after a delay: 5xx, 429, a 403 caused by an
    /// exhausted budget, dropped connections.
    Transient,

    /// The same request will fail the same way, e.g. a 404 for a repository
    /// deleted mid-import or a body we cannot decode.
    Permanent,

    /// 401. The token was revoked, expired or never valid.
    Unauthorized,
}

impl GitHubErrorKind {
    pub fn is_retriable(&self) -> bool {
        *self == GitHubErrorKind::Transient
    }
}

#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,
    /// Response status, when a response was received at all.
    pub status: Option<u16>,
    pub message: String,
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GitHub API error")?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl GitHubApiError {
    fn bare(kind: GitHubErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    /// A response arrived but could not be understood.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::bare(GitHubErrorKind::Permanent, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::bare(GitHubErrorKind::Transient, message)
    }

    /// Wraps a transport failure from octocrab.
    ///
    /// Raw `_get` calls hand back error statuses as ordinary responses, so an
    /// `octocrab::Error` here means no usable response was read. Connectivity
    /// problems are retried; URI, TLS and body errors are not.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let message = err.to_string();
        let kind = if mentions_any(&message, NETWORK_PHRASES) {
            GitHubErrorKind::Transient
        } else {
            GitHubErrorKind::Permanent
        };
        Self {
            source: Some(err),
            ..Self::bare(kind, message)
        }
    }

    /// Classifies a non-2xx response. `message` is the API's `message` field,
    /// or the raw body when there is none.
    pub fn from_status(status: u16, rate_limit: &RateLimitHeaders, message: impl Into<String>) -> Self {
        let message = message.into();
        let budget_exhausted =
            rate_limit.remaining == Some(0) || mentions_any(&message, RATE_LIMIT_PHRASES);
        let kind = match status {
            401 => GitHubErrorKind::Unauthorized,
            429 | 500..=599 => GitHubErrorKind::Transient,
            403 if budget_exhausted => GitHubErrorKind::Transient,
            _ => GitHubErrorKind::Permanent,
        };
        Self {
            status: Some(status),
            ..Self::bare(kind, message)
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == GitHubErrorKind::Unauthorized
    }
}

fn mentions_any(message: &str, phrases: &[&str]) -> bool {
    let lowered = message.to_lowercase();
    phrases.iter().any(|phrase| lowered.contains(phrase))
}
