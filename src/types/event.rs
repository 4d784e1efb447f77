//! Normalized, privacy-reduced activity events.
//!
//! A [`GitEvent`] is the only shape in which source-control activity is stored.
//! It carries counts and lengths, never raw text: commit messages, PR titles,
//! file paths and author names are reduced at the fetch/normalize boundary and
//! never reach this type. [`EventMetadata`] is a closed struct rather than a
//! free-form map so that the set of stored metadata keys cannot grow by accident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ExternalId, JobId, RepositoryId, UserId};

/// The kind of activity an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Commit,
    PullRequest,
    Review,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Commit => "commit",
            EventType::PullRequest => "pull_request",
            EventType::Review => "review",
        };
        f.write_str(s)
    }
}

/// One entry of a per-event language histogram.
///
/// `count` is the number of touched files mapped to `language`. It is a
/// deliberately coarse signal, not a line or byte count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageCount {
    pub language: String,
    pub count: u32,
}

impl LanguageCount {
    pub fn new(language: impl Into<String>, count: u32) -> Self {
        LanguageCount {
            language: language.into(),
            count,
        }
    }
}

/// State of a submitted pull request review.
///
/// The REST API reports states upper-case (`APPROVED`) while webhook payloads
/// use lower-case (`approved`); both parse to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    Unknown,
}

impl ReviewState {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "approved" => ReviewState::Approved,
            "changes_requested" => ReviewState::ChangesRequested,
            "commented" => ReviewState::Commented,
            "dismissed" => ReviewState::Dismissed,
            "pending" => ReviewState::Pending,
            _ => ReviewState::Unknown,
        }
    }
}

/// Action recorded on webhook-sourced pull request events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Closed,
    Synchronize,
}

impl PrAction {
    /// Parses the actions that produce an event; all others yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "opened" => Some(PrAction::Opened),
            "closed" => Some(PrAction::Closed),
            "synchronize" => Some(PrAction::Synchronize),
            _ => None,
        }
    }
}

/// Length of a commit message or title as stored in [`EventMetadata`]:
/// UTF-16 code units, so an emoji outside the BMP counts as two.
pub fn text_length(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Scalar metadata attached to an event.
///
/// Serialized with camelCase keys, omitting unset fields, so a stored
/// metadata object only ever contains a subset of
/// `{messageLength, titleLength, reviewState, action}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_state: Option<ReviewState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PrAction>,
}

impl EventMetadata {
    /// Metadata for a commit: message length only.
    pub fn commit(message_length: usize) -> Self {
        EventMetadata {
            message_length: Some(message_length),
            ..Default::default()
        }
    }

    /// Metadata for a pull request, with the webhook action when known.
    pub fn pull_request(title_length: usize, action: Option<PrAction>) -> Self {
        EventMetadata {
            title_length: Some(title_length),
            action,
            ..Default::default()
        }
    }

    /// Metadata for a review: its state only.
    pub fn review(state: ReviewState) -> Self {
        EventMetadata {
            review_state: Some(state),
            ..Default::default()
        }
    }
}

/// An event ready to be stored. The store assigns the id and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGitEvent {
    pub user_id: UserId,
    pub repository_id: RepositoryId,
    /// `None` for webhook-sourced events.
    pub import_job_id: Option<JobId>,
    pub external_id: ExternalId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
    pub languages: Vec<LanguageCount>,
    pub metadata: EventMetadata,
}

/// A stored event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitEvent {
    pub id: String,
    pub user_id: UserId,
    pub repository_id: RepositoryId,
    pub import_job_id: Option<JobId>,
    pub external_id: ExternalId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
    pub languages: Vec<LanguageCount>,
    pub metadata: EventMetadata,
    pub created_at: DateTime<Utc>,
}

impl GitEvent {
    pub fn from_new(id: impl Into<String>, event: NewGitEvent, created_at: DateTime<Utc>) -> Self {
        GitEvent {
            id: id.into(),
            user_id: event.user_id,
            repository_id: event.repository_id,
            import_job_id: event.import_job_id,
            external_id: event.external_id,
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            lines_added: event.lines_added,
            lines_removed: event.lines_removed,
            files_changed: event.files_changed,
            languages: event.languages,
            metadata: event.metadata,
            created_at,
        }
    }
}
