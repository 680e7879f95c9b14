//! Persisted entity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::knowledge::{ConceptKnowledge, Emotion};

/// A simulated student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Persona description used to voice the student.
    pub personality: String,
    /// Current level, starting at 1.
    pub level: u32,
    /// Cumulative XP.
    pub total_xp: u64,
    /// When the agent was created.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new level 1 agent with no XP.
    pub fn new(name: impl Into<String>, personality: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            personality: personality.into(),
            level: 1,
            total_xp: 0,
            created_at: Utc::now(),
        }
    }
}

/// A teaching session on one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeachingSession {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub concept: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// XP awarded during this session.
    pub xp_earned: u64,
    /// Successful teaching turns.
    pub turns: u32,
}

impl TeachingSession {
    /// Create a new open session.
    pub fn new(agent_id: Uuid, concept: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            concept: concept.into(),
            started_at: Utc::now(),
            ended_at: None,
            xp_earned: 0,
            turns: 0,
        }
    }

    /// Whether the session still accepts turns.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Who wrote a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human teaching.
    Teacher,
    /// The simulated student.
    Student,
}

impl Role {
    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "student" => Self::Student,
            _ => Self::Teacher,
        }
    }
}

/// One transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub understanding_delta: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A message from the teacher.
    pub fn teacher(session_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Teacher,
            content: content.into(),
            emotion: None,
            understanding_delta: None,
            created_at: Utc::now(),
        }
    }

    /// A reply from the student.
    pub fn student(
        session_id: Uuid,
        content: impl Into<String>,
        emotion: Emotion,
        understanding_delta: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Student,
            content: content.into(),
            emotion: Some(emotion),
            understanding_delta: Some(understanding_delta),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of updating one knowledge row.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    /// Decay-corrected level before the delta was applied.
    pub previous_level: f64,
    /// Level after the delta.
    pub new_level: f64,
    /// Mastery bonus due for this update, zero if already paid.
    pub mastery_bonus: u64,
    /// Row as persisted.
    pub knowledge: ConceptKnowledge,
}

/// Outcome of awarding XP to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAward {
    pub xp_awarded: u64,
    pub total_xp: u64,
    pub previous_level: u32,
    pub level: u32,
    pub leveled_up: bool,
}

/// Everything a successful teaching turn persists, applied atomically.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub session_id: Uuid,
    pub agent_id: Uuid,
    pub concept: String,
    pub emotion: Emotion,
    pub understanding_delta: f64,
    pub student_message: Message,
    pub now: DateTime<Utc>,
}

/// Result of [`TurnCommit`].
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRecord {
    pub interaction: InteractionRecord,
    pub award: XpAward,
}
