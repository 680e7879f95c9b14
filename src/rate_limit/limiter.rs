//! Fixed-window rate limiter over an injected counter store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::store::{InMemoryRateLimitStore, RateLimitStore};
use crate::config::RateLimitConfig;

/// Result of checking one request against the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window resets, rounded up.
    pub reset_after_seconds: u64,
}

/// Limits how many hits each key may make per window.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    max: u64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, window: Duration, max: u64) -> Self {
        Self { store, window, max }
    }

    /// Create an in-memory limiter from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Arc::new(InMemoryRateLimitStore::new()),
            Duration::from_secs(config.window_secs),
            config.max_turns,
        )
    }

    /// Count a hit for `key` now.
    pub async fn check(&self, key: &str) -> RateLimitCheck {
        self.check_at(key, Utc::now()).await
    }

    /// Count a hit for `key` at `now`.
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitCheck {
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
        let state = self.store.hit(key, self.window, now_ms).await;

        let allowed = state.hits <= self.max;
        let remaining = self.max.saturating_sub(state.hits);
        let reset_after_ms =
            window_ms.saturating_sub(now_ms.saturating_sub(state.window_start_ms));

        if !allowed {
            tracing::debug!(key, hits = state.hits, limit = self.max, "Rate limit exceeded");
        }

        RateLimitCheck {
            allowed,
            limit: self.max,
            remaining: if allowed { remaining } else { 0 },
            reset_after_seconds: reset_after_ms.div_ceil(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limiter(max: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            Duration::from_secs(60),
            max,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = limiter(2);
        let first = limiter.check_at("agent", at(0)).await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.limit, 2);
        assert_eq!(first.reset_after_seconds, 60);

        let second = limiter.check_at("agent", at(1)).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert_eq!(second.reset_after_seconds, 59);

        let third = limiter.check_at("agent", at(2)).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[tokio::test]
    async fn test_new_window_allows_again() {
        let limiter = limiter(1);
        assert!(limiter.check_at("agent", at(0)).await.allowed);
        assert!(!limiter.check_at("agent", at(30)).await.allowed);
        assert!(limiter.check_at("agent", at(60)).await.allowed);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = RateLimitConfig {
            window_secs: 10,
            max_turns: 3,
        };
        let check = RateLimiter::from_config(&config).check("k").await;
        assert!(check.allowed);
        assert_eq!(check.limit, 3);
        assert!(check.reset_after_seconds <= 10);
    }
}
