//! Colored terminal output for the inspection commands.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::knowledge::MASTERY_THRESHOLD;
use crate::session::KnowledgeView;
use crate::store::Agent;

/// Width of the understanding bar in characters.
const BAR_WIDTH: usize = 20;

/// Render `level` in `[0, 1]` as a fixed-width bar with a percentage.
#[must_use]
pub fn understanding_bar(level: f64, width: usize) -> String {
    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((level * width as f64).round() as usize).min(width);
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        level * 100.0
    )
}

/// One line summarizing an agent.
#[must_use]
pub fn format_agent(agent: &Agent, xp_to_next_level: Option<u64>) -> String {
    let next = xp_to_next_level.map_or_else(
        || "max level".to_string(),
        |xp| format!("{xp} XP to next level"),
    );
    format!(
        "{} {} level={} xp={} ({})",
        "[AGENT]".blue().bold(),
        agent.name.cyan(),
        agent.level,
        agent.total_xp,
        next.dimmed()
    )
}

/// One line for a decay-corrected knowledge row.
#[must_use]
pub fn format_knowledge(view: &KnowledgeView) -> String {
    let bar = understanding_bar(view.understanding_level, BAR_WIDTH);
    let bar = if view.understanding_level >= MASTERY_THRESHOLD {
        bar.green().to_string()
    } else if view.understanding_level >= 0.4 {
        bar.yellow().to_string()
    } else {
        bar.red().to_string()
    };
    let status = if view.decaying {
        format!("decaying, {} days since review", view.days_since_review)
    } else {
        format!("fresh, {} days since review", view.days_since_review)
    };
    format!(
        "  {:<16} {} examples={} ({})",
        view.concept,
        bar,
        view.examples_seen,
        status.dimmed()
    )
}

/// One line of a decay preview table.
#[must_use]
pub fn format_decay_row(days: i64, level: f64, decayed: f64) -> String {
    let lost = level - decayed;
    format!(
        "  day {:>4}  {:.4}  {}",
        days,
        decayed,
        if lost > 0.0 {
            format!("-{lost:.4}").red().to_string()
        } else {
            "unchanged".dimmed().to_string()
        }
    )
}

/// Print an agent and its knowledge.
pub fn print_agent_report(
    agent: &Agent,
    xp_to_next_level: Option<u64>,
    knowledge: &[KnowledgeView],
) {
    println!("{}", format_agent(agent, xp_to_next_level));
    if knowledge.is_empty() {
        println!("  {}", "No concepts taught yet".dimmed());
    }
    for view in knowledge {
        println!("{}", format_knowledge(view));
    }
    let _ = io::stdout().flush();
}

/// Print how `level` decays over each of `days`.
pub fn print_decay_preview(level: f64, rows: &[(i64, f64)]) {
    println!("{} starting level {level:.4}", "[DECAY]".magenta().bold());
    for &(days, decayed) in rows {
        println!("{}", format_decay_row(days, level, decayed));
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message.red());
}
