//! Knowledge state types shared by the tracker, the store and the API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emotional reaction of the student to a teaching turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Emotion {
    /// The student is thrilled and eager for more.
    Excited,
    /// The student follows the explanation.
    Understanding,
    /// No strong reaction either way.
    #[default]
    Neutral,
    /// The student is lost.
    Confused,
    /// The generator produced a tag we do not recognize.
    Unknown,
}

impl Emotion {
    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excited => "excited",
            Self::Understanding => "understanding",
            Self::Neutral => "neutral",
            Self::Confused => "confused",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a tag leniently. Anything unrecognized becomes [`Emotion::Unknown`].
    #[must_use]
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "excited" => Self::Excited,
            "understanding" => Self::Understanding,
            "neutral" => Self::Neutral,
            "confused" => Self::Confused,
            _ => Self::Unknown,
        }
    }
}

impl FromStr for Emotion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

impl From<String> for Emotion {
    fn from(tag: String) -> Self {
        Self::parse_lenient(&tag)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted row of understanding per agent and concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptKnowledge {
    /// Owning agent.
    pub agent_id: Uuid,
    /// Canonical curriculum concept name.
    pub concept: String,
    /// Mastery in `[0, 1]`.
    pub understanding_level: f64,
    /// Number of reinforcing interactions.
    pub examples_seen: u32,
    /// Most recent interaction touching this concept.
    pub last_reviewed: DateTime<Utc>,
    /// Whether the one-time mastery bonus has been paid for this concept.
    #[serde(default)]
    pub mastery_awarded: bool,
}

impl ConceptKnowledge {
    /// Returns a copy with `understanding_level` decay-corrected as of `now`.
    #[must_use]
    pub fn decayed(&self, now: DateTime<Utc>) -> Self {
        Self {
            understanding_level: super::apply_decay(
                self.last_reviewed,
                self.understanding_level,
                now,
            ),
            ..self.clone()
        }
    }
}

/// Result of a level-up check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    /// Level after the check.
    pub new_level: u32,
    /// Whether the level advanced.
    pub leveled_up: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_emotion_parse_lenient() {
        assert_eq!(Emotion::parse_lenient("excited"), Emotion::Excited);
        assert_eq!(Emotion::parse_lenient("  Understanding "), Emotion::Understanding);
        assert_eq!(Emotion::parse_lenient("NEUTRAL"), Emotion::Neutral);
        assert_eq!(Emotion::parse_lenient("confused"), Emotion::Confused);
        assert_eq!(Emotion::parse_lenient("bored"), Emotion::Unknown);
        assert_eq!(Emotion::parse_lenient(""), Emotion::Unknown);
    }

    #[test]
    fn test_emotion_serde_lowercase() {
        let json = serde_json::to_string(&Emotion::Understanding).unwrap();
        assert_eq!(json, "\"understanding\"");

        let parsed: Emotion = serde_json::from_str("\"excited\"").unwrap();
        assert_eq!(parsed, Emotion::Excited);

        // Unknown tags deserialize instead of failing the whole reply
        let parsed: Emotion = serde_json::from_str("\"sleepy\"").unwrap();
        assert_eq!(parsed, Emotion::Unknown);
    }

    #[test]
    fn test_decayed_leaves_original_untouched() {
        let now = Utc::now();
        let row = ConceptKnowledge {
            agent_id: Uuid::new_v4(),
            concept: "Functions".to_string(),
            understanding_level: 0.8,
            examples_seen: 3,
            last_reviewed: now - Duration::days(4),
            mastery_awarded: true,
        };

        let view = row.decayed(now);
        assert!((view.understanding_level - 0.76).abs() < 1e-9);
        assert!((row.understanding_level - 0.8).abs() < f64::EPSILON);
        assert_eq!(view.examples_seen, 3);
        assert!(view.mastery_awarded);
    }
}
