//! Tracked repositories and the metadata used to upsert them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RepositoryId, UserId};

/// Repository metadata as reported by the API listing or a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMeta {
    /// GitHub's numeric repository id, as a string.
    pub external_id: String,
    pub owner_login: String,
    /// Path segment used to address the repository in API calls.
    pub name: String,
    pub is_private: bool,
    pub default_branch: Option<String>,
    pub primary_language: Option<String>,
}

impl RepoMeta {
    /// `owner/name`, used for progress labels and log fields.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner_login, self.name)
    }
}

/// A repository tracked for one user. Unique on `(user_id, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: RepositoryId,
    pub user_id: UserId,
    pub external_id: String,
    pub owner_login: String,
    pub name: String,
    pub is_private: bool,
    pub default_branch: Option<String>,
    pub primary_language: Option<String>,
    /// Sync checkpoint: lower bound for the next incremental fetch.
    ///
    /// Written only after all events of a run for this repository are stored.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner_login, self.name)
    }

    /// Overwrites the descriptive fields from fresh metadata.
    ///
    /// `last_synced_at` is left untouched so an upsert never rewinds or
    /// advances the checkpoint.
    pub fn apply_meta(&mut self, meta: &RepoMeta, now: DateTime<Utc>) {
        self.owner_login = meta.owner_login.clone();
        self.name = meta.name.clone();
        self.is_private = meta.is_private;
        self.default_branch = meta.default_branch.clone();
        self.primary_language = meta.primary_language.clone();
        self.updated_at = now;
    }
}
