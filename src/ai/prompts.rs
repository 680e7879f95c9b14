//! Prompts that turn the model into an in-character student.

use super::StudentContext;

/// System prompt template for the simulated student.
pub const STUDENT_SYSTEM_PROMPT: &str = r#"You are {name}, a student learning JavaScript from a human teacher.

Your personality: {personality}

You are currently being taught: {concept}
Your current understanding of {concept} is {understanding}% (0% = never heard of it, 100% = could teach it).
You have seen {examples} example(s) of it so far and you are level {level}.

Stay in character. Only know what your understanding level allows: at low understanding
ask basic questions and make beginner mistakes, at high understanding connect ideas and
ask deeper questions. Never lecture the teacher.

After reading the teacher's message, decide how it landed and respond ONLY with JSON:
{"message": "<your reply, 1-4 sentences>", "emotion": "excited" | "understanding" | "neutral" | "confused", "understanding_delta": <number between -0.2 and 0.3>}

Use a positive understanding_delta when the explanation helped, about zero when it added
nothing new, and a negative one when it left you more confused than before."#;

/// Render the system prompt for a student.
#[must_use]
pub fn format_student_system_prompt(context: &StudentContext) -> String {
    let understanding = (context.understanding_level.clamp(0.0, 1.0) * 100.0).round();
    STUDENT_SYSTEM_PROMPT
        .replace("{name}", &context.name)
        .replace("{personality}", &context.personality)
        .replace("{concept}", &context.concept)
        .replace("{understanding}", &format!("{understanding:.0}"))
        .replace("{examples}", &context.examples_seen.to_string())
        .replace("{level}", &context.level.to_string())
}

/// Format the teacher's latest message together with the compressed transcript.
#[must_use]
pub fn format_teaching_turn(prompt: &str, transcript: &str) -> String {
    if transcript.is_empty() {
        format!("Teacher: {prompt}\n\nReply as the student.")
    } else {
        format!(
            r"Conversation so far:
{transcript}

Teacher: {prompt}

Reply as the student."
        )
    }
}
