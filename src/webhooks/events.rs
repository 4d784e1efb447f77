//! Webhook event kinds and their normalized form.
//!
//! GitHub names the event in the `X-GitHub-Event` header. Only three kinds
//! carry activity worth storing; everything else maps to
//! [`WebhookKind::Unsupported`] and is acknowledged without processing.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::{
    EventMetadata, EventType, ExternalId, LanguageCount, NewGitEvent, RepoMeta, RepositoryId,
    UserId,
};

/// The webhook event kinds this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    /// `push`: one event per pushed commit.
    Push,
    /// `pull_request`: opened, closed and synchronize actions.
    PullRequest,
    /// `pull_request_review`: submitted reviews.
    PullRequestReview,
    /// Any other event name.
    Unsupported,
}

impl WebhookKind {
    /// Maps the `X-GitHub-Event` header value to a kind.
    pub fn from_event_header(event_type: &str) -> Self {
        match event_type {
            "push" => WebhookKind::Push,
            "pull_request" => WebhookKind::PullRequest,
            "pull_request_review" => WebhookKind::PullRequestReview,
            _ => WebhookKind::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self != WebhookKind::Unsupported
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WebhookKind::Push => "push",
            WebhookKind::PullRequest => "pull_request",
            WebhookKind::PullRequestReview => "pull_request_review",
            WebhookKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// An activity event extracted from a webhook payload, not yet attributed to
/// a user or repository record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWebhookEvent {
    pub external_id: ExternalId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
    pub languages: Vec<LanguageCount>,
    pub metadata: EventMetadata,
}

impl NormalizedWebhookEvent {
    /// Attributes the event. Webhook-sourced events never carry an import job.
    pub fn into_new_event(self, user_id: UserId, repository_id: RepositoryId) -> NewGitEvent {
        NewGitEvent {
            user_id,
            repository_id,
            import_job_id: None,
            external_id: self.external_id,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            lines_added: self.lines_added,
            lines_removed: self.lines_removed,
            files_changed: self.files_changed,
            languages: self.languages,
            metadata: self.metadata,
        }
    }
}

/// Output of normalizing one payload.
///
/// `repo_meta` is always present, even when the action produced no events, so
/// repository tracking stays current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeResult {
    pub events: Vec<NormalizedWebhookEvent>,
    pub repo_meta: RepoMeta,
}
