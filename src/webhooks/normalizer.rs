//! Webhook payload normalization.
//!
//! Each supported event kind has one pure function reducing its payload to
//! [`NormalizedWebhookEvent`]s plus the repository metadata. Only counts and
//! lengths survive: commit messages, titles, file paths and author names are
//! read here and dropped.
//!
//! # Parsing Strategy
//!
//! 1. The kind comes from the `X-GitHub-Event` header ([`WebhookKind`])
//! 2. The payload is deserialized into a minimal raw struct for that kind
//! 3. Actions that do not produce activity yield no events, but still yield
//!    the repository metadata
//! 4. Malformed payloads return `Err` with details

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::github::detect_languages;
use crate::types::{
    EventMetadata, EventType, ExternalId, PrAction, RepoMeta, ReviewState, text_length,
};

use super::events::{NormalizeResult, NormalizedWebhookEvent, WebhookKind};

/// Error type for webhook payload failures.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has invalid value (e.g., an unparseable timestamp).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Normalizes a payload of the given kind.
///
/// Returns `Ok(None)` for [`WebhookKind::Unsupported`].
pub fn normalize(kind: WebhookKind, payload: &Value) -> Result<Option<NormalizeResult>, NormalizeError> {
    match kind {
        WebhookKind::Push => normalize_push(payload).map(Some),
        WebhookKind::PullRequest => normalize_pull_request(payload).map(Some),
        WebhookKind::PullRequestReview => normalize_pull_request_review(payload).map(Some),
        WebhookKind::Unsupported => Ok(None),
    }
}

/// The numeric id of the account that triggered the delivery.
///
/// A missing or zero id means there is nobody to attribute the activity to.
pub fn sender_id(payload: &Value) -> Option<u64> {
    payload
        .get("sender")
        .and_then(|sender| sender.get("id"))
        .and_then(Value::as_u64)
        .filter(|id| *id != 0)
}

// ============================================================================
// Raw payload structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRepository {
    id: u64,
    name: String,
    owner: RawOwner,
    #[serde(default)]
    private: bool,
    default_branch: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

impl RawRepository {
    fn into_meta(self) -> RepoMeta {
        RepoMeta {
            external_id: self.id.to_string(),
            owner_login: self.owner.login,
            name: self.name,
            is_private: self.private,
            default_branch: self.default_branch,
            primary_language: self.language,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(default)]
    commits: Vec<RawPushCommit>,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawPushCommit {
    id: String,
    #[serde(default)]
    message: String,
    timestamp: String,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    id: u64,
    #[serde(default)]
    title: String,
    merged_at: Option<String>,
    updated_at: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
}

#[derive(Debug, Deserialize)]
struct RawReviewPayload {
    action: String,
    review: RawReview,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    id: u64,
    state: String,
    submitted_at: Option<String>,
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NormalizeError::InvalidField {
            field,
            value: value.to_string(),
        })
}

// ============================================================================
// push
// ============================================================================

/// One commit event per pushed commit.
///
/// Removed paths count towards `files_changed` but carry no language signal.
/// Push payloads have no line counts, so both are zero.
pub fn normalize_push(payload: &Value) -> Result<NormalizeResult, NormalizeError> {
    let raw = RawPushPayload::deserialize(payload)?;

    let events = raw
        .commits
        .into_iter()
        .map(|commit| -> Result<NormalizedWebhookEvent, NormalizeError> {
            let occurred_at = parse_timestamp("commits[].timestamp", &commit.timestamp)?;
            let files_changed = commit.added.len() + commit.modified.len() + commit.removed.len();
            let languages = detect_languages(
                commit
                    .added
                    .iter()
                    .chain(commit.modified.iter())
                    .map(String::as_str),
            );
            Ok(NormalizedWebhookEvent {
                external_id: ExternalId::new(commit.id),
                event_type: EventType::Commit,
                occurred_at,
                lines_added: 0,
                lines_removed: 0,
                files_changed: files_changed as u64,
                languages,
                metadata: EventMetadata::commit(text_length(&commit.message)),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NormalizeResult {
        events,
        repo_meta: raw.repository.into_meta(),
    })
}

// ============================================================================
// pull_request
// ============================================================================

/// One pull request event for `opened`, `closed` and `synchronize`.
///
/// The event occurs at the merge time when merged, otherwise at `updated_at`.
pub fn normalize_pull_request(payload: &Value) -> Result<NormalizeResult, NormalizeError> {
    let raw = RawPullRequestPayload::deserialize(payload)?;
    let repo_meta = raw.repository.into_meta();

    let Some(action) = PrAction::parse(&raw.action) else {
        return Ok(NormalizeResult {
            events: Vec::new(),
            repo_meta,
        });
    };

    let pr = raw.pull_request;
    let occurred_at = match pr.merged_at.as_deref() {
        Some(merged_at) => parse_timestamp("pull_request.merged_at", merged_at)?,
        None => parse_timestamp("pull_request.updated_at", &pr.updated_at)?,
    };

    let event = NormalizedWebhookEvent {
        external_id: ExternalId::from(pr.id),
        event_type: EventType::PullRequest,
        occurred_at,
        lines_added: pr.additions,
        lines_removed: pr.deletions,
        files_changed: pr.changed_files,
        languages: Vec::new(),
        metadata: EventMetadata::pull_request(text_length(&pr.title), Some(action)),
    };

    Ok(NormalizeResult {
        events: vec![event],
        repo_meta,
    })
}

// ============================================================================
// pull_request_review
// ============================================================================

/// One review event when a review is `submitted`.
pub fn normalize_pull_request_review(payload: &Value) -> Result<NormalizeResult, NormalizeError> {
    let raw = RawReviewPayload::deserialize(payload)?;
    let repo_meta = raw.repository.into_meta();

    if raw.action != "submitted" {
        return Ok(NormalizeResult {
            events: Vec::new(),
            repo_meta,
        });
    }

    let review = raw.review;
    let Some(submitted_at) = review.submitted_at.as_deref() else {
        return Err(NormalizeError::InvalidField {
            field: "review.submitted_at",
            value: "null".to_string(),
        });
    };

    let event = NormalizedWebhookEvent {
        external_id: ExternalId::from(review.id),
        event_type: EventType::Review,
        occurred_at: parse_timestamp("review.submitted_at", submitted_at)?,
        lines_added: 0,
        lines_removed: 0,
        files_changed: 0,
        languages: Vec::new(),
        metadata: EventMetadata::review(ReviewState::parse(&review.state)),
    };

    Ok(NormalizeResult {
        events: vec![event],
        repo_meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pull_request_payload, push_payload, review_payload};
    use crate::types::LanguageCount;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn push_emits_one_event_per_commit() {
        let payload = push_payload(
            42,
            1001,
            &[
                ("aaa", &["src/new.ts"], &["src/app.ts", "README.md"], &["old.py"]),
                ("bbb", &[], &["lib.rs"], &[]),
            ],
        );

        let result = normalize_push(&payload).unwrap();
        assert_eq!(result.events.len(), 2);

        let first = &result.events[0];
        assert_eq!(first.external_id, ExternalId::new("aaa"));
        assert_eq!(first.event_type, EventType::Commit);
        assert_eq!(first.files_changed, 4);
        assert_eq!(first.lines_added, 0);
        assert_eq!(first.lines_removed, 0);
        // Removed files carry no language; README.md maps to Markdown.
        assert_eq!(
            first.languages,
            vec![LanguageCount::new("TypeScript", 2), LanguageCount::new("Markdown", 1)]
        );
        assert_eq!(first.metadata, EventMetadata::commit("Update the thing".len()));
        assert_eq!(
            first.occurred_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );

        assert_eq!(result.events[1].languages, vec![LanguageCount::new("Rust", 1)]);
    }

    #[test]
    fn push_extracts_repository_meta() {
        let result = normalize_push(&push_payload(42, 1001, &[])).unwrap();
        assert!(result.events.is_empty());
        assert_eq!(
            result.repo_meta,
            RepoMeta {
                external_id: "1001".to_string(),
                owner_login: "octocat".to_string(),
                name: "hello-world".to_string(),
                is_private: true,
                default_branch: Some("main".to_string()),
                primary_language: Some("TypeScript".to_string()),
            }
        );
    }

    #[test]
    fn commit_message_length_is_in_utf16_units() {
        let mut payload = push_payload(42, 1001, &[("aaa", &[], &[], &[])]);
        payload["commits"][0]["message"] = json!("ship it 🚀");
        let result = normalize_push(&payload).unwrap();
        assert_eq!(result.events[0].metadata, EventMetadata::commit(10));
    }

    #[test]
    fn push_with_bad_timestamp_is_invalid() {
        let mut payload = push_payload(42, 1001, &[("aaa", &[], &[], &[])]);
        payload["commits"][0]["timestamp"] = json!("yesterday");
        let err = normalize_push(&payload).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::InvalidField { field: "commits[].timestamp", .. }
        ));
    }

    #[test]
    fn push_without_repository_is_a_json_error() {
        let err = normalize_push(&json!({"commits": []})).unwrap_err();
        assert!(matches!(err, NormalizeError::JsonError(_)));
    }

    #[test]
    fn merged_pull_request_occurs_at_merge_time() {
        let payload = pull_request_payload(42, 1001, "closed", 555, Some("2024-05-02T08:00:00Z"));
        let result = normalize_pull_request(&payload).unwrap();
        assert_eq!(result.events.len(), 1);

        let event = &result.events[0];
        assert_eq!(event.external_id, ExternalId::new("555"));
        assert_eq!(event.event_type, EventType::PullRequest);
        assert_eq!(event.occurred_at, Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
        assert_eq!((event.lines_added, event.lines_removed, event.files_changed), (40, 10, 3));
        assert_eq!(
            event.metadata,
            EventMetadata::pull_request("Add a feature".len(), Some(PrAction::Closed))
        );
    }

    #[test]
    fn unmerged_pull_request_occurs_at_update_time() {
        let payload = pull_request_payload(42, 1001, "opened", 555, None);
        let result = normalize_pull_request(&payload).unwrap();
        assert_eq!(
            result.events[0].occurred_at,
            Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(result.events[0].metadata.action, Some(PrAction::Opened));
    }

    #[test]
    fn other_pull_request_actions_emit_only_repo_meta() {
        for action in ["labeled", "reopened", "edited", "assigned"] {
            let payload = pull_request_payload(42, 1001, action, 555, None);
            let result = normalize_pull_request(&payload).unwrap();
            assert!(result.events.is_empty(), "{action} should not emit");
            assert_eq!(result.repo_meta.external_id, "1001");
        }
    }

    #[test]
    fn submitted_review_emits_event() {
        let payload = review_payload(42, 1001, "submitted", 777, "approved");
        let result = normalize_pull_request_review(&payload).unwrap();
        assert_eq!(result.events.len(), 1);

        let event = &result.events[0];
        assert_eq!(event.external_id, ExternalId::new("777"));
        assert_eq!(event.event_type, EventType::Review);
        assert_eq!(event.metadata, EventMetadata::review(ReviewState::Approved));
        assert_eq!(event.occurred_at, Utc.with_ymd_and_hms(2024, 5, 3, 12, 30, 0).unwrap());
    }

    #[test]
    fn dismissed_or_edited_review_emits_nothing() {
        for action in ["dismissed", "edited"] {
            let payload = review_payload(42, 1001, action, 777, "approved");
            assert!(normalize_pull_request_review(&payload).unwrap().events.is_empty());
        }
    }

    #[test]
    fn normalize_ignores_unsupported_kind() {
        let payload = json!({"zen": "Keep it logically awesome."});
        assert!(normalize(WebhookKind::Unsupported, &payload).unwrap().is_none());
    }

    #[test]
    fn normalized_metadata_never_contains_text() {
        let payload = push_payload(42, 1001, &[("aaa", &["a.rs"], &[], &[])]);
        let result = normalize(WebhookKind::Push, &payload).unwrap().unwrap();
        let meta = serde_json::to_string(&result.events[0].metadata).unwrap();
        assert!(!meta.contains("Update the thing"));
        assert!(!meta.contains("a.rs"));
    }

    #[test]
    fn sender_id_treats_zero_and_missing_as_absent() {
        assert_eq!(sender_id(&json!({"sender": {"id": 42}})), Some(42));
        assert_eq!(sender_id(&json!({"sender": {"id": 0}})), None);
        assert_eq!(sender_id(&json!({"sender": {}})), None);
        assert_eq!(sender_id(&json!({})), None);
    }
}
