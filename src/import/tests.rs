//! Scenario tests for the import orchestrator.
//!
//! These run full jobs against a [`MemoryStore`] and a scripted [`FakeGitHub`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};

use super::{ImportError, ImportOrchestrator, ImportSettings};
use crate::store::{EventStore, JobStore, MemoryStore, RepositoryStore};
use crate::test_utils::{
    FakeGitHub, REPOS_PAGE_1, commit_json, commits_path, pull_json, pulls_path, repo_json,
    review_json, reviews_path,
};
use crate::types::{
    ErrorDetails, EventMetadata, EventType, ExternalId, ImportJob, JobId, JobStatus, NewGitEvent,
    RepositoryId, UserId,
};

// ─── Test Helpers ───

const USER: &str = "user-1";

struct Harness {
    store: Arc<MemoryStore>,
    github: FakeGitHub,
    orchestrator: ImportOrchestrator<MemoryStore, FakeGitHub>,
}

fn harness(github: FakeGitHub) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store
        .link_account(UserId::new(USER), 1, Some("gho_test_token".to_string()))
        .unwrap();
    let orchestrator = ImportOrchestrator::new(
        Arc::clone(&store),
        Arc::new(github.clone()),
        ImportSettings::default(),
    );
    Harness {
        store,
        github,
        orchestrator,
    }
}

async fn new_job(store: &MemoryStore) -> ImportJob {
    store.create_job(&UserId::new(USER)).await.unwrap()
}

/// Two repositories: alpha has three commits, beta has one merged PR with one review.
fn two_repo_github() -> FakeGitHub {
    FakeGitHub::new()
        .with_page(
            REPOS_PAGE_1,
            json!([repo_json(1, "octocat", "alpha"), repo_json(2, "octocat", "beta")]),
        )
        .with_page(
            &commits_path("octocat", "alpha", 1),
            json!([
                commit_json("c1", "2024-01-01T00:00:00Z", &["src/lib.rs"]),
                commit_json("c2", "2024-01-02T00:00:00Z", &["web/app.ts", "web/app.css"]),
                commit_json("c3", "2024-01-03T00:00:00Z", &["README.md"]),
            ]),
        )
        .with_page(
            &pulls_path("octocat", "beta", 1),
            json!([
                pull_json(500, 5, Some("2024-02-01T00:00:00Z")),
                pull_json(501, 6, None),
            ]),
        )
        .with_page(
            &reviews_path("octocat", "beta", 5),
            json!([review_json(600, "APPROVED", Some("2024-01-31T00:00:00Z"))]),
        )
}

fn existing_event(external_id: &str) -> NewGitEvent {
    NewGitEvent {
        user_id: UserId::new(USER),
        repository_id: RepositoryId::new("webhook-repo"),
        import_job_id: None,
        external_id: ExternalId::new(external_id),
        event_type: EventType::Commit,
        occurred_at: Utc::now(),
        lines_added: 0,
        lines_removed: 0,
        files_changed: 0,
        languages: vec![],
        metadata: EventMetadata::commit(1),
    }
}

fn commits(range: std::ops::Range<u32>) -> Value {
    let items: Vec<Value> = range
        .map(|i| commit_json(&format!("{i:040x}"), "2024-01-01T00:00:00Z", &["main.go"]))
        .collect();
    json!(items)
}

// ─── Scenarios ───

#[tokio::test]
async fn two_repositories_with_one_known_commit() {
    let h = harness(two_repo_github());
    h.store.create(existing_event("c3")).await.unwrap();
    let job = new_job(&h.store).await;

    let summary = h.orchestrator.run(&job.id).await.unwrap();

    assert_eq!(summary.repositories, 2);
    assert_eq!(summary.events_stored, 4);
    assert_eq!(summary.events_skipped, 1);

    let job = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_items, 2);
    assert_eq!(job.total_items, Some(2));
    assert_eq!(job.progress, 100);
    assert_eq!(job.current_repository.as_deref(), Some("octocat/beta"));
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.error_details.is_none());

    let events = h.store.list_events(&UserId::new(USER)).await.unwrap();
    let imported: Vec<_> = events
        .iter()
        .filter(|e| e.import_job_id.as_ref() == Some(&job.id))
        .collect();
    assert_eq!(imported.len(), 4);

    let count = |t: EventType| imported.iter().filter(|e| e.event_type == t).count();
    assert_eq!(count(EventType::Commit), 2);
    assert_eq!(count(EventType::PullRequest), 1);
    assert_eq!(count(EventType::Review), 1);

    let review = imported.iter().find(|e| e.event_type == EventType::Review).unwrap();
    assert_eq!(review.external_id.as_str(), "600");
    assert_eq!(
        serde_json::to_value(&review.metadata).unwrap(),
        json!({"reviewState": "approved"})
    );
}

#[tokio::test]
async fn access_token_is_passed_to_connector() {
    let h = harness(two_repo_github());
    let job = new_job(&h.store).await;

    h.orchestrator.run(&job.id).await.unwrap();

    assert_eq!(h.github.tokens(), vec!["gho_test_token".to_string()]);
}

#[tokio::test]
async fn every_repository_gets_a_checkpoint() {
    let h = harness(two_repo_github());
    let job = new_job(&h.store).await;
    let before = Utc::now();

    h.orchestrator.run(&job.id).await.unwrap();

    let repositories = h.store.list_repositories(&UserId::new(USER)).await.unwrap();
    assert_eq!(repositories.len(), 2);
    for repository in repositories {
        let synced = repository.last_synced_at.expect("checkpoint written");
        assert!(synced >= before);
    }
}

#[tokio::test]
async fn immediate_rerun_is_a_no_op() {
    let h = harness(two_repo_github());
    let first = new_job(&h.store).await;
    h.orchestrator.run(&first.id).await.unwrap();
    let events_after_first = h.store.list_events(&UserId::new(USER)).await.unwrap().len();
    let requests_after_first = h.github.request_count();

    let second = new_job(&h.store).await;
    let summary = h.orchestrator.run(&second.id).await.unwrap();

    assert_eq!(summary.events_stored, 0);
    assert_eq!(
        h.store.list_events(&UserId::new(USER)).await.unwrap().len(),
        events_after_first
    );

    // The second run fetches incrementally from the checkpoint.
    let second_run_requests = &h.github.requests()[requests_after_first..];
    assert!(
        second_run_requests
            .iter()
            .filter(|path| path.contains("/commits"))
            .all(|path| path.contains("since=")),
        "requests: {second_run_requests:?}"
    );
}

#[tokio::test]
async fn two_hundred_fifty_commits_insert_in_three_batches() {
    let github = FakeGitHub::new()
        .with_page(REPOS_PAGE_1, json!([repo_json(1, "octocat", "big")]))
        .with_page(&commits_path("octocat", "big", 1), commits(0..100))
        .with_page(&commits_path("octocat", "big", 2), commits(100..200))
        .with_page(&commits_path("octocat", "big", 3), commits(200..250));
    let h = harness(github);
    let job = new_job(&h.store).await;

    let summary = h.orchestrator.run(&job.id).await.unwrap();

    assert_eq!(summary.events_stored, 250);
    assert_eq!(h.store.recorded_batch_sizes(), vec![100, 100, 50]);
}

#[tokio::test]
async fn exhausted_job_makes_no_calls() {
    let h = harness(two_repo_github());
    let mut job = new_job(&h.store).await;
    job.status = JobStatus::Failed;
    job.error_details = Some(ErrorDetails {
        attempts: 3,
        last_error: "boom".to_string(),
    });
    h.store.put_job(job.clone());

    let err = h.orchestrator.run(&job.id).await.unwrap_err();

    assert!(matches!(err, ImportError::RetriesExhausted { max_attempts: 3, .. }));
    assert!(err.to_string().contains("exceeded maximum retry attempts"));
    assert_eq!(h.github.request_count(), 0);
    assert!(h.github.tokens().is_empty());
    assert_eq!(h.store.get_job(&job.id).await.unwrap().unwrap(), job);
}

#[tokio::test]
async fn missing_job_is_rejected() {
    let h = harness(two_repo_github());

    let err = h.orchestrator.run(&JobId::new("missing")).await.unwrap_err();

    assert!(matches!(err, ImportError::JobNotFound(_)));
    assert_eq!(h.github.request_count(), 0);
}

#[tokio::test]
async fn non_startable_status_is_rejected_without_mutation() {
    let h = harness(two_repo_github());
    for status in [JobStatus::InProgress, JobStatus::Completed] {
        let mut job = new_job(&h.store).await;
        job.status = status;
        h.store.put_job(job.clone());

        let err = h.orchestrator.run(&job.id).await.unwrap_err();

        assert!(matches!(err, ImportError::InvalidStatus { status: s, .. } if s == status));
        assert_eq!(h.store.get_job(&job.id).await.unwrap().unwrap(), job);
    }
    assert_eq!(h.github.request_count(), 0);
}

#[tokio::test]
async fn failure_is_recorded_then_returned() {
    let github = two_repo_github().with_response(
        &commits_path("octocat", "beta", 1),
        502,
        json!({"message": "Bad Gateway"}),
    );
    let h = harness(github);
    let job = new_job(&h.store).await;

    let err = h.orchestrator.run(&job.id).await.unwrap_err();
    assert!(matches!(err, ImportError::GitHub(_)));
    assert!(err.is_retryable());

    let failed = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts(), 1);
    assert_eq!(failed.processed_items, 1);
    let message = failed.error_message.as_deref().unwrap();
    assert!(message.contains("HTTP 502"), "message: {message}");
    assert_eq!(failed.error_details.unwrap().last_error, message);

    // alpha finished before beta failed, so only alpha has a checkpoint.
    let repositories = h.store.list_repositories(&UserId::new(USER)).await.unwrap();
    let checkpoint = |name: &str| {
        repositories
            .iter()
            .find(|r| r.name == name)
            .unwrap()
            .last_synced_at
    };
    assert!(checkpoint("alpha").is_some());
    assert!(checkpoint("beta").is_none());
}

#[tokio::test]
async fn failed_completion_write_leaves_job_retryable() {
    let h = harness(FakeGitHub::new());
    let job = new_job(&h.store).await;
    h.store.fail_next_status_write(JobStatus::Completed);

    let err = h.orchestrator.run(&job.id).await.unwrap_err();
    assert!(matches!(err, ImportError::Store(_)));

    let failed = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts(), 1);
    assert!(failed.error_message.as_deref().unwrap().contains("injected failure"));
    assert!(failed.can_retry(h.orchestrator.settings().max_attempts));

    h.orchestrator.run(&job.id).await.unwrap();
    let job = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn failed_start_write_leaves_job_untouched() {
    let h = harness(two_repo_github());
    let job = new_job(&h.store).await;
    h.store.fail_next_status_write(JobStatus::InProgress);

    let err = h.orchestrator.run(&job.id).await.unwrap_err();
    assert!(matches!(err, ImportError::Store(_)));
    assert_eq!(h.github.request_count(), 0);

    let unchanged = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, JobStatus::Pending);
    assert_eq!(unchanged.attempts(), 0);
}

#[tokio::test]
async fn failed_job_can_be_rerun_to_completion() {
    let github = two_repo_github().with_response(
        &commits_path("octocat", "beta", 1),
        500,
        json!({"message": "Server Error"}),
    );
    let h = harness(github);
    let job = new_job(&h.store).await;
    h.orchestrator.run(&job.id).await.unwrap_err();

    h.github
        .set_response(&commits_path("octocat", "beta", 1), 200, json!([]));
    let summary = h.orchestrator.run(&job.id).await.unwrap();

    // alpha's commits were stored by the first run.
    assert_eq!(summary.events_stored, 2);
    let job = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_details.is_none());
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn attempts_accumulate_across_failed_runs() {
    let github = FakeGitHub::new().with_response(REPOS_PAGE_1, 503, json!({"message": "Unavailable"}));
    let h = harness(github);
    let job = new_job(&h.store).await;

    for expected in 1..=3 {
        h.orchestrator.run(&job.id).await.unwrap_err();
        let job = h.store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.attempts(), expected);
    }

    let requests = h.github.request_count();
    let err = h.orchestrator.run(&job.id).await.unwrap_err();
    assert!(matches!(err, ImportError::RetriesExhausted { .. }));
    assert_eq!(h.github.request_count(), requests);
}

#[tokio::test]
async fn missing_token_fails_with_authentication() {
    let store = Arc::new(MemoryStore::new());
    let github = two_repo_github();
    let orchestrator =
        ImportOrchestrator::new(Arc::clone(&store), Arc::new(github.clone()), ImportSettings::default());
    let job = store.create_job(&UserId::new("unlinked")).await.unwrap();

    let err = orchestrator.run(&job.id).await.unwrap_err();

    assert!(matches!(err, ImportError::Authentication(_)));
    assert_eq!(github.request_count(), 0);
    let job = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts(), 1);
}

#[tokio::test]
async fn revoked_token_fails_with_authentication() {
    let github = FakeGitHub::new().with_response(REPOS_PAGE_1, 401, json!({"message": "Bad credentials"}));
    let h = harness(github);
    let job = new_job(&h.store).await;

    let err = h.orchestrator.run(&job.id).await.unwrap_err();

    assert!(matches!(err, ImportError::Authentication(ref m) if m == "Bad credentials"));
    let job = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(job.error_message.as_deref(), Some("authentication failed: Bad credentials"));
}

#[tokio::test]
async fn user_without_repositories_completes_at_zero_progress() {
    let h = harness(FakeGitHub::new());
    let job = new_job(&h.store).await;

    let summary = h.orchestrator.run(&job.id).await.unwrap();

    assert_eq!(summary.repositories, 0);
    let job = h.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_items, Some(0));
    assert_eq!(job.progress, 0);
}
