//! Authenticated GitHub transport.
//!
//! The fetcher talks to GitHub only through [`GitHubTransport`], a single
//! `GET` returning status, rate-limit headers and the decoded JSON body. This
//! keeps pagination, rate-limit accounting and error classification in one
//! place and lets tests substitute a scripted transport.
//!
//! [`OctocrabClient`] is the production implementation. A
//! [`GitHubConnector`] builds one per access token, since budgets and
//! permissions are issued per token.

use std::future::Future;

use octocrab::Octocrab;
use serde_json::Value;

use super::error::GitHubApiError;
use super::rate_limit::RateLimitHeaders;

/// Public API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// One decoded API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub rate_limit: RateLimitHeaders,
    /// `Value::Null` for an empty body.
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The API's `message` field, falling back to the serialized body.
    pub fn error_message(&self) -> String {
        match self.body.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => self.body.to_string(),
        }
    }
}

/// Issues authenticated `GET` requests against the GitHub REST API.
///
/// `path_and_query` is relative to the API base, e.g. `/user/repos?page=2`.
/// Non-success statuses are returned as `Ok` so the caller can read their
/// rate-limit headers; `Err` is reserved for requests that produced no response.
pub trait GitHubTransport: Send + Sync {
    fn get(
        &self,
        path_and_query: &str,
    ) -> impl Future<Output = Result<ApiResponse, GitHubApiError>> + Send;
}

/// Creates a transport authenticated with one user's access token.
pub trait GitHubConnector: Send + Sync {
    type Transport: GitHubTransport;

    fn connect(&self, access_token: &str) -> Result<Self::Transport, GitHubApiError>;
}

/// A GitHub transport backed by octocrab.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
}

impl OctocrabClient {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Creates a client from a personal or OAuth access token.
    pub fn from_token(token: impl Into<String>, api_base: &str) -> Result<Self, GitHubApiError> {
        let client = Octocrab::builder()
            .base_uri(api_base)
            .map_err(GitHubApiError::from_octocrab)?
            .personal_token(token.into())
            .build()
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(Self::new(client))
    }

    /// Returns a reference to the underlying octocrab client.
    pub fn inner(&self) -> &Octocrab {
        &self.client
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient").finish_non_exhaustive()
    }
}

impl GitHubTransport for OctocrabClient {
    async fn get(&self, path_and_query: &str) -> Result<ApiResponse, GitHubApiError> {
        let response = self
            .client
            ._get(path_and_query)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        let status = response.status().as_u16();
        let rate_limit = RateLimitHeaders::from_header_map(response.headers());
        let text = self
            .client
            .body_to_string(response)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                GitHubApiError::malformed(format!(
                    "invalid JSON from {}: {}",
                    path_and_query, e
                ))
            })?
        };

        Ok(ApiResponse {
            status,
            rate_limit,
            body,
        })
    }
}

/// Builds [`OctocrabClient`]s against a configurable API base.
#[derive(Debug, Clone)]
pub struct OctocrabConnector {
    api_base: String,
}

impl OctocrabConnector {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for OctocrabConnector {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl GitHubConnector for OctocrabConnector {
    type Transport = OctocrabClient;

    fn connect(&self, access_token: &str) -> Result<OctocrabClient, GitHubApiError> {
        OctocrabClient::from_token(access_token, &self.api_base)
    }
}
