//! The student-reply capability consumed by the session orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AiError;
use crate::knowledge::Emotion;
use crate::store::Message;

/// What the generator knows about the student it voices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentContext {
    pub name: String,
    pub personality: String,
    /// Concept being taught.
    pub concept: String,
    /// Decay-corrected understanding of the concept.
    pub understanding_level: f64,
    pub examples_seen: u32,
    /// Agent level.
    pub level: u32,
}

/// The student's in-character reply to one teaching turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReply {
    pub message: String,
    pub emotion: Emotion,
    /// Change in understanding this turn caused, within `[-1, 1]`.
    pub understanding_delta: f64,
}

impl StudentReply {
    /// Create a reply, clamping `understanding_delta` into `[-1, 1]`.
    #[must_use]
    pub fn new(message: impl Into<String>, emotion: Emotion, understanding_delta: f64) -> Self {
        let understanding_delta = if understanding_delta.is_nan() {
            0.0
        } else {
            understanding_delta.clamp(-1.0, 1.0)
        };
        Self {
            message: message.into(),
            emotion,
            understanding_delta,
        }
    }

    /// Reply used when the generator is unavailable. Carries no learning.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(FALLBACK_MESSAGE, Emotion::Neutral, 0.0)
    }
}

/// Fixed text of the fallback reply.
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I lost my train of thought for a second. Could you explain that again?";

#[derive(Deserialize)]
struct WireReply {
    message: String,
    #[serde(default)]
    emotion: Emotion,
    #[serde(default, alias = "understandingDelta")]
    understanding_delta: f64,
}

impl<'de> Deserialize<'de> for StudentReply {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WireReply::deserialize(deserializer)?;
        Ok(Self::new(wire.message, wire.emotion, wire.understanding_delta))
    }
}

/// Produces the student's replies.
#[async_trait]
pub trait StudentGenerator: Send + Sync {
    /// Generate a reply to `prompt` given the student's state and the transcript so far.
    async fn generate(
        &self,
        prompt: &str,
        context: &StudentContext,
        history: &[Message],
    ) -> Result<StudentReply, AiError>;
}
