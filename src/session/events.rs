//! Progress events broadcast to live listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default capacity for the progress broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event sent to SSE clients when a student makes progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Type of event (`session_started`, `turn_completed`, `level_up`, `session_ended`).
    pub event_type: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Event payload as JSON value.
    pub data: serde_json::Value,
}

impl ProgressEvent {
    pub const SESSION_STARTED: &'static str = "session_started";
    pub const TURN_COMPLETED: &'static str = "turn_completed";
    pub const LEVEL_UP: &'static str = "level_up";
    pub const SESSION_ENDED: &'static str = "session_ended";

    /// Create a new progress event.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}
