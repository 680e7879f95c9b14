//! AI student: prompts, transcript compression, and provider clients.

mod client;
mod context;
mod prompts;
mod student;

pub use client::*;
pub use context::TranscriptCompressor;
pub use prompts::{format_student_system_prompt, format_teaching_turn, STUDENT_SYSTEM_PROMPT};
pub use student::{StudentContext, StudentGenerator, StudentReply, FALLBACK_MESSAGE};
