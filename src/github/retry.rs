//! Exponential backoff with jitter, and a bounded retry loop built on it.
//!
//! The delay before retry `attempt` (0-indexed) is
//! `min(base * 2^attempt, max)` scaled by a uniform factor in `[0.5, 1.0]`, so
//! concurrent callers that failed together do not retry in lockstep.
//!
//! - Default: 1s base, 60s cap
//! - Webhook ingestion: 3 attempts in total, malformed payloads never retried

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Lower bound of the jitter factor.
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound of the jitter factor.
pub const JITTER_MAX: f64 = 1.0;

/// Base and cap of the exponential backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffConfig {
    pub const DEFAULT: Self = Self {
        base: Duration::from_millis(1000),
        max: Duration::from_millis(60_000),
    };

    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// The un-jittered delay for `attempt`: `min(base * 2^attempt, max)`.
    pub fn ceiling_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2f64.powi(attempt.min(63) as i32);
        let delay_secs = self.base.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max.as_secs_f64()))
    }

    /// Scales the ceiling for `attempt` by `factor`, clamped into the jitter range.
    pub fn delay_with_factor(&self, attempt: u32, factor: f64) -> Duration {
        self.ceiling_for_attempt(attempt)
            .mul_f64(factor.clamp(JITTER_MIN, JITTER_MAX))
    }

    /// The jittered delay for `attempt`, drawing the factor at random.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.delay_with_factor(attempt, factor)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Suspends for the jittered backoff delay of `attempt`.
pub async fn wait_with_backoff(attempt: u32, backoff: BackoffConfig) {
    tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
}

/// Configuration for a bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        backoff: BackoffConfig::DEFAULT,
    };

    pub fn new(max_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of a retry loop.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// The operation succeeded.
    Success(T),

    /// Every attempt failed.
    ExhaustedRetries {
        /// The error from the final attempt.
        last_error: E,
        /// Number of attempts made (including the initial attempt).
        attempts: u32,
    },

    /// An attempt failed in a way another attempt would repeat.
    PermanentError(E),
}

impl<T, E> RetryResult<T, E> {
    /// Converts to a Result, treating exhausted retries as Err.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Runs `operation` until it succeeds, `config.max_attempts` attempts have
/// failed, or an attempt fails with an error for which `is_retriable` is
/// false. The last case returns [`RetryResult::PermanentError`] at once.
///
/// Between attempts the loop waits [`wait_with_backoff`] for the attempt just
/// made, and logs the failure.
pub async fn retry_with_backoff<T, E, R, F, Fut>(
    config: RetryConfig,
    is_retriable: R,
    mut operation: F,
) -> RetryResult<T, E>
where
    E: Display,
    R: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if !is_retriable(&e) => return RetryResult::PermanentError(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                warn!(
                    attempt,
                    max_attempts,
                    error = %e,
                    "Attempt failed, backing off before retry"
                );
                wait_with_backoff(attempt - 1, config.backoff).await;
            }
        }
    }
}
