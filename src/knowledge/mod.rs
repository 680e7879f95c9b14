//! Knowledge model for the simulated student.
//!
//! Tracks understanding per concept, forgetting over time, and the XP and
//! level progression earned while being taught.

mod curriculum;
mod tracker;
mod types;

pub use curriculum::{canonical_concept, concept_index, JAVASCRIPT_CURRICULUM};
pub use tracker::*;
pub use types::{ConceptKnowledge, Emotion, LevelUp};
