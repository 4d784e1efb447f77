//! Per-run rate-limit accounting.
//!
//! GitHub reports the remaining request budget on every response. A
//! [`RateLimiter`] records the latest values and decides when a fetch session
//! should stop and wait for the window to reset. One limiter belongs to one
//! import run (budgets are issued per token), and it is passed by `&mut` into
//! every fetch call rather than shared.

use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use tracing::{debug, info, warn};

/// Budget assumed before the first response has been seen.
pub const DEFAULT_RATE_LIMIT: i64 = 5000;

/// Fraction of the budget that may be consumed before pausing.
pub const PAUSE_THRESHOLD: f64 = 0.8;

/// Extra time waited past the advertised reset instant.
pub const RESET_SAFETY_MARGIN: Duration = Duration::from_secs(2);

const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Rate-limit values read from one response. Absent or unparseable headers are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub remaining: Option<i64>,
    pub limit: Option<i64>,
    /// Epoch seconds at which the window resets.
    pub reset: Option<i64>,
}

impl RateLimitHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };

        RateLimitHeaders {
            remaining: read(HEADER_REMAINING),
            limit: read(HEADER_LIMIT),
            reset: read(HEADER_RESET),
        }
    }
}

/// Snapshot of the tracked budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: i64,
    pub limit: i64,
    pub reset_at_epoch_secs: i64,
}

impl Default for RateLimitState {
    fn default() -> Self {
        RateLimitState {
            remaining: DEFAULT_RATE_LIMIT,
            limit: DEFAULT_RATE_LIMIT,
            reset_at_epoch_secs: 0,
        }
    }
}

/// Tracks the request budget of one fetch session.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    state: RateLimitState,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RateLimitState {
        self.state
    }

    /// Folds one response's headers into the tracked state.
    ///
    /// Only the headers that are present overwrite their counterpart.
    pub fn handle_response(&mut self, headers: &RateLimitHeaders) {
        if let Some(remaining) = headers.remaining {
            self.state.remaining = remaining;
        }
        if let Some(limit) = headers.limit {
            self.state.limit = limit;
        }
        if let Some(reset) = headers.reset {
            self.state.reset_at_epoch_secs = reset;
        }
    }

    /// True once at least [`PAUSE_THRESHOLD`] of the budget has been consumed.
    pub fn should_pause(&self) -> bool {
        let consumed = self.state.limit - self.state.remaining;
        consumed as f64 >= PAUSE_THRESHOLD * self.state.limit as f64
    }

    /// How long to wait at `now_epoch_secs` before the budget is refreshed.
    ///
    /// `None` when the reset instant has already passed.
    pub fn wait_duration_at(&self, now_epoch_secs: i64) -> Option<Duration> {
        let remaining_secs = self.state.reset_at_epoch_secs - now_epoch_secs;
        if remaining_secs <= 0 {
            return None;
        }
        Some(Duration::from_secs(remaining_secs as u64) + RESET_SAFETY_MARGIN)
    }

    /// Suspends until the reset instant plus the safety margin.
    pub async fn wait_for_reset(&self) {
        match self.wait_duration_at(Utc::now().timestamp()) {
            Some(wait) => {
                info!(
                    remaining = self.state.remaining,
                    limit = self.state.limit,
                    wait_secs = wait.as_secs(),
                    "Rate limit budget low, waiting for reset"
                );
                tokio::time::sleep(wait).await;
            }
            None => debug!("Rate limit reset already passed, not waiting"),
        }
    }

    /// Waits for the reset if the budget is low. Returns true if it paused.
    ///
    /// Called before every request of a fetch session.
    pub async fn pause_if_needed(&self) -> bool {
        if !self.should_pause() {
            return false;
        }
        warn!(
            remaining = self.state.remaining,
            limit = self.state.limit,
            "Pausing GitHub requests until the rate limit resets"
        );
        self.wait_for_reset().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use proptest::prelude::*;

    fn limiter(remaining: i64, limit: i64, reset: i64) -> RateLimiter {
        let mut limiter = RateLimiter::new();
        limiter.handle_response(&RateLimitHeaders {
            remaining: Some(remaining),
            limit: Some(limit),
            reset: Some(reset),
        });
        limiter
    }

    #[test]
    fn starts_with_generous_default() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.state().remaining, 5000);
        assert_eq!(limiter.state().limit, 5000);
        assert!(!limiter.should_pause());
    }

    #[test]
    fn pauses_at_eighty_percent_consumed() {
        assert!(!limiter(1001, 5000, 0).should_pause());
        assert!(limiter(1000, 5000, 0).should_pause());
        assert!(limiter(0, 5000, 0).should_pause());
    }

    #[test]
    fn threshold_scales_with_reported_limit() {
        assert!(!limiter(13, 60, 0).should_pause());
        assert!(limiter(12, 60, 0).should_pause());
    }

    #[test]
    fn missing_headers_leave_state_unchanged() {
        let mut limiter = limiter(4000, 5000, 1_700_000_000);
        limiter.handle_response(&RateLimitHeaders {
            remaining: Some(3999),
            limit: None,
            reset: None,
        });
        assert_eq!(
            limiter.state(),
            RateLimitState {
                remaining: 3999,
                limit: 5000,
                reset_at_epoch_secs: 1_700_000_000,
            }
        );
    }

    #[test]
    fn parses_headers_from_response() {
        let mut map = HeaderMap::new();
        map.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        map.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        map.insert("x-ratelimit-limit", HeaderValue::from_static("not-a-number"));

        let headers = RateLimitHeaders::from_header_map(&map);
        assert_eq!(headers.remaining, Some(42));
        assert_eq!(headers.reset, Some(1_700_000_000));
        assert_eq!(headers.limit, None);
    }

    #[test]
    fn no_wait_when_reset_is_in_the_past() {
        let limiter = limiter(0, 5000, 1_000);
        assert_eq!(limiter.wait_duration_at(1_000), None);
        assert_eq!(limiter.wait_duration_at(2_000), None);
    }

    #[test]
    fn wait_includes_safety_margin() {
        let limiter = limiter(0, 5000, 1_060);
        assert_eq!(limiter.wait_duration_at(1_000), Some(Duration::from_secs(62)));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_reset_sleeps_until_reset_plus_margin() {
        let reset = Utc::now().timestamp() + 30;
        let limiter = limiter(0, 5000, reset);

        let start = tokio::time::Instant::now();
        limiter.wait_for_reset().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_secs(30), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(33), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_if_needed_skips_when_budget_is_healthy() {
        let limiter = limiter(4900, 5000, Utc::now().timestamp() + 3600);
        let start = tokio::time::Instant::now();
        assert!(!limiter.pause_if_needed().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn pause_decision_matches_consumed_fraction(limit in 1i64..100_000, used in 0i64..100_000) {
            let used = used.min(limit);
            let limiter = limiter(limit - used, limit, 0);
            prop_assert_eq!(limiter.should_pause(), used as f64 >= 0.8 * limit as f64);
        }
    }
}
