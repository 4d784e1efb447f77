//! Service configuration.
//!
//! Loaded from a TOML file, then overridden by environment variables. A
//! missing file is not an error; every key has a default.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [github]
//! api_base = "https://api.github.com"
//! webhook_secret = "..."
//!
//! [import]
//! batch_size = 100
//! max_attempts = 3
//!
//! [webhook]
//! max_attempts = 3
//!
//! [backoff]
//! base_ms = 1000
//! max_ms = 60000
//!
//! [[accounts]]
//! user_id = "user-1"
//! github_id = 583231
//! token_env = "USER_1_GITHUB_TOKEN"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::github::{BackoffConfig, DEFAULT_API_BASE, RetryConfig};
use crate::import::{DEFAULT_BATCH_SIZE, ImportSettings};
use crate::types::{MAX_IMPORT_ATTEMPTS, UserId};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "GIT_ACTIVITY_SYNC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "git-activity-sync.toml";

const BIND_ENV: &str = "GIT_ACTIVITY_SYNC_BIND";
const API_BASE_ENV: &str = "GITHUB_API_BASE";
const WEBHOOK_SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub import: ImportConfig,
    pub webhook: WebhookConfig,
    pub backoff: BackoffSettings,
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    /// Empty means every webhook delivery is rejected.
    pub webhook_secret: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            webhook_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub max_attempts: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: MAX_IMPORT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebhookConfig {
    pub max_attempts: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: RetryConfig::DEFAULT.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            max_ms: 60_000,
        }
    }
}

/// A user whose GitHub account is linked at startup.
///
/// The token itself never appears in the file; `token_env` names the
/// environment variable holding it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    pub user_id: String,
    pub github_id: u64,
    pub token_env: Option<String>,
}

impl AccountConfig {
    pub fn user_id(&self) -> UserId {
        UserId::new(self.user_id.clone())
    }

    /// Reads the access token through `lookup`. `None` if unset or empty.
    pub fn access_token(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.token_env
            .as_deref()
            .and_then(lookup)
            .filter(|token| !token.is_empty())
    }
}

impl Config {
    /// Loads the file named by `GIT_ACTIVITY_SYNC_CONFIG` (or the default
    /// path), then applies environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides file values with any set environment variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup(BIND_ENV) {
            self.server.bind = bind;
        }
        if let Some(api_base) = lookup(API_BASE_ENV) {
            self.github.api_base = api_base;
        }
        if let Some(secret) = lookup(WEBHOOK_SECRET_ENV) {
            self.github.webhook_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.import.batch_size == 0 {
            return Err(ConfigError::Invalid("import.batch_size must be >= 1".to_string()));
        }
        if self.import.max_attempts == 0 {
            return Err(ConfigError::Invalid("import.max_attempts must be >= 1".to_string()));
        }
        if self.webhook.max_attempts == 0 {
            return Err(ConfigError::Invalid("webhook.max_attempts must be >= 1".to_string()));
        }
        if self.backoff.base_ms > self.backoff.max_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.base_ms ({}) must not exceed backoff.max_ms ({})",
                self.backoff.base_ms, self.backoff.max_ms
            )));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.server.bind)))
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            batch_size: self.import.batch_size,
            max_attempts: self.import.max_attempts,
        }
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::new(
            Duration::from_millis(self.backoff.base_ms),
            Duration::from_millis(self.backoff.max_ms),
        )
    }

    /// Retry policy for webhook deliveries.
    pub fn webhook_retry(&self) -> RetryConfig {
        RetryConfig::new(self.webhook.max_attempts, self.backoff())
    }
}
