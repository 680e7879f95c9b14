//! HTTP API for teaching students and watching their progress.

mod api;
mod error;
mod handlers;
#[allow(clippy::module_inception)]
mod server;
mod state;

pub use api::{
    AgentResponse, CreateAgentRequest, CurriculumResponse, ErrorBody, HealthResponse,
    StartSessionRequest, TeachRequest, TranscriptQuery, MAX_TRANSCRIPT_LIMIT,
};
pub use error::{ApiError, ServerError};
pub use handlers::apply_rate_limit_headers;
pub use server::PupilServer;
pub use state::{AppState, SharedOrchestrator};
