//! Pluggable storage for fixed-window hit counters.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Counter state of one key after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Start of the current window, in milliseconds since the epoch.
    pub window_start_ms: u64,
    /// Hits counted in the current window, including this one.
    pub hits: u64,
}

/// Backing store for rate-limit counters.
///
/// Entries expire once their window has elapsed; an expired key starts a
/// fresh window on its next hit.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one hit for `key` and return the window it landed in.
    async fn hit(&self, key: &str, window: Duration, now_ms: u64) -> WindowState;
}

#[derive(Debug)]
struct Counters {
    entries: HashMap<String, WindowState>,
    last_sweep_ms: u64,
}

/// Process-local counter store.
#[derive(Debug)]
pub struct InMemoryRateLimitStore {
    state: Mutex<Counters>,
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRateLimitStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Counters {
                entries: HashMap::new(),
                last_sweep_ms: 0,
            }),
        }
    }

    /// Number of tracked keys, expired or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether no keys are tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration, now_ms: u64) -> WindowState {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let mut state = self.state.lock().await;

        if now_ms.saturating_sub(state.last_sweep_ms) >= window_ms {
            state
                .entries
                .retain(|_, entry| now_ms.saturating_sub(entry.window_start_ms) < window_ms);
            state.last_sweep_ms = now_ms;
        }

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert(WindowState {
                window_start_ms: now_ms,
                hits: 0,
            });

        if now_ms.saturating_sub(entry.window_start_ms) >= window_ms {
            entry.window_start_ms = now_ms;
            entry.hits = 0;
        }

        entry.hits = entry.hits.saturating_add(1);
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_hits_accumulate_within_window() {
        let store = InMemoryRateLimitStore::new();
        assert_eq!(store.hit("a", WINDOW, 1_000).await.hits, 1);
        assert_eq!(store.hit("a", WINDOW, 2_000).await.hits, 2);
        let state = store.hit("a", WINDOW, 60_999).await;
        assert_eq!(state.hits, 3);
        assert_eq!(state.window_start_ms, 1_000);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        store.hit("a", WINDOW, 1_000).await;
        assert_eq!(store.hit("b", WINDOW, 1_000).await.hits, 1);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let store = InMemoryRateLimitStore::new();
        store.hit("a", WINDOW, 1_000).await;
        store.hit("a", WINDOW, 2_000).await;
        let state = store.hit("a", WINDOW, 61_000).await;
        assert_eq!(state.hits, 1);
        assert_eq!(state.window_start_ms, 61_000);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_keys() {
        let store = InMemoryRateLimitStore::new();
        store.hit("old", WINDOW, 100_000).await;
        assert_eq!(store.len().await, 1);

        store.hit("new", WINDOW, 200_000).await;
        assert_eq!(store.len().await, 1);
        assert!(!store.is_empty().await);
    }
}
