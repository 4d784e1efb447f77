//! Shared test utilities: a scripted GitHub transport and JSON fixtures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::{Value, json};

use crate::github::{ApiResponse, GitHubApiError, GitHubConnector, GitHubTransport, RateLimitHeaders};
use crate::types::{ExternalId, UserId};

#[derive(Default)]
struct FakeState {
    responses: HashMap<String, (u16, Value)>,
    rate_limit: RateLimitHeaders,
    requests: Vec<String>,
    /// When each request arrived, on tokio's clock.
    request_times: Vec<tokio::time::Instant>,
    tokens: Vec<String>,
}

/// A GitHub transport answering from a script of `path → (status, body)`.
///
/// Paths without a scripted response answer `200 []`, i.e. an empty listing.
/// Clones share the script and the request log, so a test can hand one clone
/// to the code under test and inspect another.
#[derive(Clone, Default)]
pub struct FakeGitHub {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, path: &str, body: Value) -> Self {
        self.with_response(path, 200, body)
    }

    pub fn with_response(self, path: &str, status: u16, body: Value) -> Self {
        self.set_response(path, status, body);
        self
    }

    pub fn with_rate_limit(self, rate_limit: RateLimitHeaders) -> Self {
        self.state.lock().unwrap().rate_limit = rate_limit;
        self
    }

    pub fn set_response(&self, path: &str, status: u16, body: Value) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(path.to_string(), (status, body));
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_times(&self) -> Vec<tokio::time::Instant> {
        self.state.lock().unwrap().request_times.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Tokens passed to [`GitHubConnector::connect`], in order.
    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }
}

impl GitHubTransport for FakeGitHub {
    async fn get(&self, path_and_query: &str) -> Result<ApiResponse, GitHubApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(path_and_query.to_string());
        state.request_times.push(tokio::time::Instant::now());
        let (status, body) = state
            .responses
            .get(path_and_query)
            .cloned()
            .unwrap_or((200, json!([])));
        Ok(ApiResponse {
            status,
            rate_limit: state.rate_limit,
            body,
        })
    }
}

impl GitHubConnector for FakeGitHub {
    type Transport = FakeGitHub;

    fn connect(&self, access_token: &str) -> Result<FakeGitHub, GitHubApiError> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .push(access_token.to_string());
        Ok(self.clone())
    }
}

// ─── Paths ────────────────────────────────────────────────────────────────────

pub const REPOS_PAGE_1: &str = "/user/repos?type=owner&per_page=100&page=1";

pub fn commits_path(owner: &str, repo: &str, page: u32) -> String {
    format!("/repos/{owner}/{repo}/commits?per_page=100&page={page}")
}

pub fn pulls_path(owner: &str, repo: &str, page: u32) -> String {
    format!("/repos/{owner}/{repo}/pulls?state=closed&sort=updated&direction=desc&per_page=100&page={page}")
}

pub fn reviews_path(owner: &str, repo: &str, number: u64) -> String {
    format!("/repos/{owner}/{repo}/pulls/{number}/reviews?per_page=100")
}

// ─── REST fixtures ────────────────────────────────────────────────────────────

pub fn repo_json(id: u64, owner: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "full_name": format!("{owner}/{name}"),
        "owner": {"login": owner, "id": 1},
        "private": false,
        "default_branch": "main",
        "language": "Rust"
    })
}

pub fn commit_json(sha: &str, date: &str, files: &[&str]) -> Value {
    let files: Vec<Value> = files.iter().map(|f| json!({"filename": f})).collect();
    json!({
        "sha": sha,
        "author": {"login": "octocat", "id": 1},
        "commit": {
            "message": format!("commit {sha}"),
            "author": {"name": "The Octocat", "email": "octocat@example.com", "date": date},
            "committer": {"name": "GitHub", "date": date}
        },
        "stats": {"additions": 3, "deletions": 1, "total": 4},
        "files": files
    })
}

pub fn pull_json(id: u64, number: u64, merged_at: Option<&str>) -> Value {
    json!({
        "id": id,
        "number": number,
        "title": format!("PR {number}"),
        "state": "closed",
        "merged_at": merged_at,
        "updated_at": merged_at.unwrap_or("2024-01-01T00:00:00Z"),
        "additions": 20,
        "deletions": 5,
        "changed_files": 2
    })
}

pub fn review_json(id: u64, state: &str, submitted_at: Option<&str>) -> Value {
    json!({
        "id": id,
        "user": {"login": "reviewer", "id": 2},
        "body": "Looks good",
        "state": state,
        "submitted_at": submitted_at
    })
}

// ─── Webhook fixtures ─────────────────────────────────────────────────────────

fn webhook_repository(repo_id: u64) -> Value {
    json!({
        "id": repo_id,
        "name": "hello-world",
        "full_name": "octocat/hello-world",
        "owner": {"login": "octocat", "id": 1},
        "private": true,
        "default_branch": "main",
        "language": "TypeScript"
    })
}

/// A push with one commit per `(sha, added, modified, removed)`.
pub fn push_payload(sender_id: u64, repo_id: u64, commits: &[(&str, &[&str], &[&str], &[&str])]) -> Value {
    let commits: Vec<Value> = commits
        .iter()
        .map(|(sha, added, modified, removed)| {
            json!({
                "id": sha,
                "message": "Update the thing",
                "timestamp": "2024-05-01T10:00:00+02:00",
                "author": {"name": "The Octocat", "email": "octocat@example.com", "username": "octocat"},
                "added": added,
                "modified": modified,
                "removed": removed
            })
        })
        .collect();

    json!({
        "ref": "refs/heads/main",
        "commits": commits,
        "repository": webhook_repository(repo_id),
        "sender": {"login": "octocat", "id": sender_id}
    })
}

pub fn pull_request_payload(sender_id: u64, repo_id: u64, action: &str, pr_id: u64, merged_at: Option<&str>) -> Value {
    json!({
        "action": action,
        "number": 7,
        "pull_request": {
            "id": pr_id,
            "number": 7,
            "title": "Add a feature",
            "merged_at": merged_at,
            "updated_at": "2024-05-02T09:00:00Z",
            "additions": 40,
            "deletions": 10,
            "changed_files": 3
        },
        "repository": webhook_repository(repo_id),
        "sender": {"login": "octocat", "id": sender_id}
    })
}

pub fn review_payload(sender_id: u64, repo_id: u64, action: &str, review_id: u64, state: &str) -> Value {
    json!({
        "action": action,
        "review": {
            "id": review_id,
            "body": "Please rename this",
            "state": state,
            "submitted_at": "2024-05-03T12:30:00Z"
        },
        "pull_request": {"id": 900, "number": 7},
        "repository": webhook_repository(repo_id),
        "sender": {"login": "reviewer", "id": sender_id}
    })
}

// ─── Generators ───────────────────────────────────────────────────────────────

pub fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9]{8}".prop_map(UserId::new)
}

pub fn arb_sha() -> impl Strategy<Value = ExternalId> {
    "[0-9a-f]{40}".prop_map(ExternalId::new)
}
