//! Shared state for the HTTP handlers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ai::StudentGenerator;
use crate::config::{RateLimitConfig, TutorConfig};
use crate::rate_limit::RateLimiter;
use crate::session::{Orchestrator, ProgressEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::store::PupilStore;

/// Orchestrator over a type-erased student generator.
pub type SharedOrchestrator = Orchestrator<dyn StudentGenerator>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs teaching sessions.
    pub orchestrator: SharedOrchestrator,
    /// Per-agent limit on teaching turns, disabled when `None`.
    pub limiter: Option<RateLimiter>,
    /// Sender for broadcasting progress events to SSE clients.
    pub event_tx: broadcast::Sender<ProgressEvent>,
    /// Cancellation token for graceful shutdown.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Wire the store and generator into a new state.
    ///
    /// A `max_turns` of zero disables rate limiting.
    #[must_use]
    pub fn new(
        store: PupilStore,
        generator: Arc<dyn StudentGenerator>,
        tutor: &TutorConfig,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let orchestrator = Orchestrator::new(store, generator, tutor).with_events(event_tx.clone());
        let limiter = (rate_limit.max_turns > 0).then(|| RateLimiter::from_config(rate_limit));

        Self {
            orchestrator,
            limiter,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the rate limiter.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Option<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
