//! Rate-limited, paginating reads of a user's GitHub history.
//!
//! Every request goes through [`get_json`], which pauses on a low budget,
//! feeds the response headers back into the [`RateLimiter`] and classifies
//! non-success statuses. Listings are fetched `PER_PAGE` at a time until a
//! short page.
//!
//! Items are reduced to privacy-safe shapes here: commit messages and PR
//! titles become lengths, file paths become a language histogram, and none of
//! the raw text leaves this module.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::client::GitHubTransport;
use super::error::GitHubApiError;
use super::languages::detect_languages;
use super::rate_limit::RateLimiter;
use crate::types::{ExternalId, LanguageCount, PrNumber, RepoMeta, ReviewState, text_length};

/// Page size used for every listing.
pub const PER_PAGE: usize = 100;

/// A commit reduced to counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub sha: ExternalId,
    pub author_login: Option<String>,
    pub date: DateTime<Utc>,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
    pub message_length: usize,
    pub languages: Vec<LanguageCount>,
}

/// A merged pull request reduced to counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestMeta {
    /// GitHub's numeric PR id (not the number).
    pub external_id: ExternalId,
    pub number: PrNumber,
    pub title_length: usize,
    pub merged_at: DateTime<Utc>,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
}

/// A submitted review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewMeta {
    pub external_id: ExternalId,
    pub state: ReviewState,
    pub submitted_at: DateTime<Utc>,
}

// ─── Raw API shapes ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawRepo {
    id: u64,
    name: String,
    owner: RawOwner,
    #[serde(default)]
    private: bool,
    default_branch: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGitActor {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawCommitDetail {
    #[serde(default)]
    message: String,
    author: Option<RawGitActor>,
    committer: Option<RawGitActor>,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    sha: String,
    author: Option<RawOwner>,
    commit: RawCommitDetail,
    stats: Option<RawStats>,
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawPull {
    id: u64,
    number: u64,
    #[serde(default)]
    title: String,
    merged_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    additions: Option<u64>,
    deletions: Option<u64>,
    changed_files: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    id: u64,
    #[serde(default)]
    state: String,
    submitted_at: Option<DateTime<Utc>>,
}

// ─── Normalization ────────────────────────────────────────────────────────────

fn repo_meta(raw: RawRepo) -> RepoMeta {
    RepoMeta {
        external_id: raw.id.to_string(),
        owner_login: raw.owner.login,
        name: raw.name,
        is_private: raw.private,
        default_branch: raw.default_branch,
        primary_language: raw.language,
    }
}

fn commit_meta(raw: RawCommit) -> Option<CommitMeta> {
    let date = raw
        .commit
        .author
        .as_ref()
        .and_then(|a| a.date)
        .or_else(|| raw.commit.committer.as_ref().and_then(|c| c.date));
    let Some(date) = date else {
        warn!(sha = %raw.sha, "Commit has no author or committer date, skipping");
        return None;
    };

    let (lines_added, lines_removed) = raw
        .stats
        .as_ref()
        .map_or((0, 0), |s| (s.additions, s.deletions));
    let files = raw.files.unwrap_or_default();

    Some(CommitMeta {
        sha: ExternalId::new(raw.sha),
        author_login: raw.author.map(|a| a.login),
        date,
        lines_added,
        lines_removed,
        files_changed: files.len() as u64,
        message_length: text_length(&raw.commit.message),
        languages: detect_languages(files.iter().map(|f| f.filename.as_str())),
    })
}

fn pull_request_meta(raw: RawPull) -> Option<PullRequestMeta> {
    let merged_at = raw.merged_at?;
    Some(PullRequestMeta {
        external_id: ExternalId::from(raw.id),
        number: PrNumber(raw.number),
        title_length: text_length(&raw.title),
        merged_at,
        lines_added: raw.additions.unwrap_or(0),
        lines_removed: raw.deletions.unwrap_or(0),
        files_changed: raw.changed_files.unwrap_or(0),
    })
}

fn review_meta(raw: RawReview) -> Option<ReviewMeta> {
    let submitted_at = raw.submitted_at?;
    Some(ReviewMeta {
        external_id: ExternalId::from(raw.id),
        state: ReviewState::parse(&raw.state),
        submitted_at,
    })
}

// ─── Requests ─────────────────────────────────────────────────────────────────

/// Issues one rate-limited `GET` and returns the JSON body of a success response.
pub async fn get_json<T: GitHubTransport>(
    transport: &T,
    limiter: &mut RateLimiter,
    path_and_query: &str,
) -> Result<Value, GitHubApiError> {
    limiter.pause_if_needed().await;

    let response = transport.get(path_and_query).await?;
    limiter.handle_response(&response.rate_limit);

    if !response.is_success() {
        return Err(GitHubApiError::from_status(
            response.status,
            &response.rate_limit,
            response.error_message(),
        ));
    }

    Ok(response.body)
}

fn decode<R: DeserializeOwned>(body: Value, path: &str) -> Result<R, GitHubApiError> {
    serde_json::from_value(body).map_err(|e| {
        GitHubApiError::malformed(format!("unexpected response shape from {}: {}", path, e))
    })
}

fn page_path(base: &str, page: u32) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}per_page={PER_PAGE}&page={page}")
}

/// Fetches one page of a listing.
async fn get_page<T, R>(
    transport: &T,
    limiter: &mut RateLimiter,
    base: &str,
    page: u32,
) -> Result<Vec<R>, GitHubApiError>
where
    T: GitHubTransport,
    R: DeserializeOwned,
{
    let path = page_path(base, page);
    let body = get_json(transport, limiter, &path).await?;
    let items: Vec<R> = decode(body, &path)?;
    debug!(path = %path, items = items.len(), "Fetched page");
    Ok(items)
}

/// Fetches every page of a listing, stopping at the first short page.
async fn get_all_pages<T, R>(
    transport: &T,
    limiter: &mut RateLimiter,
    base: &str,
) -> Result<Vec<R>, GitHubApiError>
where
    T: GitHubTransport,
    R: DeserializeOwned,
{
    let mut all = Vec::new();
    let mut page = 1u32;

    loop {
        let items: Vec<R> = get_page(transport, limiter, base, page).await?;
        let is_last_page = items.len() < PER_PAGE;
        all.extend(items);

        if is_last_page {
            break;
        }
        page += 1;
    }

    Ok(all)
}

fn repo_path(owner: &str, repo: &str) -> String {
    format!(
        "/repos/{}/{}",
        urlencoding::encode(owner),
        urlencoding::encode(repo)
    )
}

fn format_since(since: DateTime<Utc>) -> String {
    urlencoding::encode(&since.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

/// Lists every repository owned by the authenticated user.
pub async fn fetch_user_repositories<T: GitHubTransport>(
    transport: &T,
    limiter: &mut RateLimiter,
) -> Result<Vec<RepoMeta>, GitHubApiError> {
    let raw: Vec<RawRepo> = get_all_pages(transport, limiter, "/user/repos?type=owner").await?;
    Ok(raw.into_iter().map(repo_meta).collect())
}

/// Lists commits of one repository, optionally only those after `since`.
///
/// An empty repository (HTTP 409 from the commits listing) yields no commits.
pub async fn fetch_repository_commits<T: GitHubTransport>(
    transport: &T,
    limiter: &mut RateLimiter,
    owner: &str,
    repo: &str,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<CommitMeta>, GitHubApiError> {
    let mut base = format!("{}/commits", repo_path(owner, repo));
    if let Some(since) = since {
        base.push_str(&format!("?since={}", format_since(since)));
    }

    let raw: Vec<RawCommit> = match get_all_pages(transport, limiter, &base).await {
        Ok(raw) => raw,
        Err(e) if e.status == Some(409) => {
            debug!(owner, repo, "Repository is empty, no commits to fetch");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    Ok(raw.into_iter().filter_map(commit_meta).collect())
}

/// Lists merged pull requests of one repository, optionally only those merged at or after `since`.
///
/// Closed PRs are listed most recently updated first, so paging stops once a
/// whole page was last updated before `since`: a PR merged after `since` was
/// necessarily updated after it too.
pub async fn fetch_repository_pull_requests<T: GitHubTransport>(
    transport: &T,
    limiter: &mut RateLimiter,
    owner: &str,
    repo: &str,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<PullRequestMeta>, GitHubApiError> {
    let base = format!(
        "{}/pulls?state=closed&sort=updated&direction=desc",
        repo_path(owner, repo)
    );

    let mut merged = Vec::new();
    let mut page = 1u32;

    loop {
        let items: Vec<RawPull> = get_page(transport, limiter, &base, page).await?;
        let is_last_page = items.len() < PER_PAGE;
        let page_is_stale = match since {
            Some(since) => items
                .iter()
                .all(|pr| pr.updated_at.is_some_and(|updated| updated < since)),
            None => false,
        };

        merged.extend(
            items
                .into_iter()
                .filter_map(pull_request_meta)
                .filter(|pr| since.is_none_or(|since| pr.merged_at >= since)),
        );

        if is_last_page || page_is_stale {
            break;
        }
        page += 1;
    }

    Ok(merged)
}

/// Lists submitted reviews of one pull request.
///
/// A single page is requested; reviews without a submission time are skipped.
pub async fn fetch_pull_request_reviews<T: GitHubTransport>(
    transport: &T,
    limiter: &mut RateLimiter,
    owner: &str,
    repo: &str,
    number: PrNumber,
) -> Result<Vec<ReviewMeta>, GitHubApiError> {
    let path = format!(
        "{}/pulls/{}/reviews?per_page={}",
        repo_path(owner, repo),
        number.0,
        PER_PAGE
    );
    let body = get_json(transport, limiter, &path).await?;
    let raw: Vec<RawReview> = decode(body, &path)?;
    Ok(raw.into_iter().filter_map(review_meta).collect())
}
