//! Transcript compression for student prompts.
//!
//! Keeps the most recent messages of a teaching session within a character
//! budget so long sessions do not overflow the model's context.

use crate::store::{Message, Role};

/// Longest single message kept verbatim in the transcript.
const MAX_MESSAGE_CHARS: usize = 400;

/// Compressor for session history to fit within prompt limits.
#[derive(Debug, Clone)]
pub struct TranscriptCompressor {
    /// Maximum number of messages to include.
    max_messages: usize,
    /// Maximum total characters in output.
    max_chars: usize,
}

impl Default for TranscriptCompressor {
    fn default() -> Self {
        Self {
            max_messages: 20,
            max_chars: 6000,
        }
    }
}

impl TranscriptCompressor {
    /// Create a new compressor with custom limits.
    #[must_use]
    pub fn new(max_messages: usize, max_chars: usize) -> Self {
        Self {
            max_messages,
            max_chars,
        }
    }

    /// Compress messages (oldest first) into a transcript string.
    ///
    /// When the budget is exceeded the oldest lines are dropped first.
    #[must_use]
    pub fn compress(&self, messages: &[Message]) -> String {
        let mut kept: Vec<String> = Vec::new();
        let mut used = 0;

        for message in messages.iter().rev().take(self.max_messages) {
            let line = Self::summarize_message(message);
            let cost = line.len() + usize::from(!kept.is_empty());
            if used + cost > self.max_chars {
                break;
            }
            used += cost;
            kept.push(line);
        }

        kept.reverse();
        kept.join("\n")
    }

    fn summarize_message(message: &Message) -> String {
        let content = truncate(message.content.trim(), MAX_MESSAGE_CHARS);
        match (message.role, message.emotion) {
            (Role::Teacher, _) => format!("Teacher: {content}"),
            (Role::Student, Some(emotion)) => format!("Student ({emotion}): {content}"),
            (Role::Student, None) => format!("Student: {content}"),
        }
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed.
/// Uses char boundaries to ensure UTF-8 safety.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let target_len = max_len.saturating_sub(3);
        let truncate_at = s
            .char_indices()
            .take_while(|(i, c)| i + c.len_utf8() <= target_len)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &s[..truncate_at])
    }
}
