//! Per-user aggregate statistics over stored events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{EventStore, RepositoryStore, StoreError};
use crate::types::{EventType, GitEvent, UserId};

/// How many of a user's events touched a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageUsage {
    pub language: String,
    /// Number of events whose histogram mentions the language, not a file count.
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_repositories: usize,
    pub total_commits: usize,
    pub total_pull_requests: usize,
    pub total_reviews: usize,
    /// Most used first; ties broken by name.
    pub languages: Vec<LanguageUsage>,
    pub earliest_event_date: Option<DateTime<Utc>>,
    pub latest_event_date: Option<DateTime<Utc>>,
}

/// Aggregates a user's repositories and events.
pub async fn compute<S>(store: &S, user_id: &UserId) -> Result<UserStats, StoreError>
where
    S: EventStore + RepositoryStore,
{
    let repositories = store.list_repositories(user_id).await?;
    let events = store.list_events(user_id).await?;

    let mut stats = summarize(&events);
    stats.total_repositories = repositories.len();
    Ok(stats)
}

fn summarize(events: &[GitEvent]) -> UserStats {
    let mut stats = UserStats::default();
    let mut languages: HashMap<&str, u32> = HashMap::new();

    for event in events {
        match event.event_type {
            EventType::Commit => stats.total_commits += 1,
            EventType::PullRequest => stats.total_pull_requests += 1,
            EventType::Review => stats.total_reviews += 1,
        }

        for entry in &event.languages {
            *languages.entry(entry.language.as_str()).or_default() += 1;
        }

        stats.earliest_event_date = Some(match stats.earliest_event_date {
            Some(earliest) => earliest.min(event.occurred_at),
            None => event.occurred_at,
        });
        stats.latest_event_date = Some(match stats.latest_event_date {
            Some(latest) => latest.max(event.occurred_at),
            None => event.occurred_at,
        });
    }

    let mut languages: Vec<LanguageUsage> = languages
        .into_iter()
        .map(|(language, count)| LanguageUsage {
            language: language.to_string(),
            count,
        })
        .collect();
    languages.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.language.cmp(&b.language)));
    stats.languages = languages;

    stats
}
