//! Request and response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::store::Agent;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code such as `not_found`.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// Response for GET /api/health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Response for GET /api/curriculum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumResponse {
    /// Concepts in teaching order.
    pub concepts: Vec<String>,
}

/// Body of POST /api/agents.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub personality: String,
}

/// Maximum length of an agent name.
pub const MAX_NAME_CHARS: usize = 64;

/// Agent with progress towards its next level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(flatten)]
    pub agent: Agent,
    /// XP still needed for the next level, absent at the top level.
    pub xp_to_next_level: Option<u64>,
}

/// Body of POST /api/agents/{id}/sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    pub concept: String,
}

/// Body of POST /api/sessions/{id}/messages.
#[derive(Debug, Clone, Deserialize)]
pub struct TeachRequest {
    pub message: String,
}

/// Query parameters for GET /api/sessions/{id}/messages.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptQuery {
    /// Maximum number of most recent messages to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl TranscriptQuery {
    /// Get the effective limit, capped at `MAX_TRANSCRIPT_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.min(MAX_TRANSCRIPT_LIMIT)
    }
}

impl Default for TranscriptQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

/// Maximum allowed transcript page.
pub const MAX_TRANSCRIPT_LIMIT: usize = 1000;

const fn default_limit() -> usize {
    100
}
