//! Teaching session orchestration.

mod error;
mod events;
mod orchestrator;

pub use error::SessionError;
pub use events::{ProgressEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
pub use orchestrator::{KnowledgeView, Orchestrator, SessionSummary, TurnOutcome};
