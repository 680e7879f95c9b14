//! Knowledge tracker: decay, interaction deltas, XP and level progression.
//!
//! Every function here is pure. Callers pass "now" explicitly so results are
//! reproducible; the `*_now` variants read the wall clock for convenience.
//!
//! Numeric inputs must not be `NaN`. Out-of-range values are clamped rather
//! than rejected.

use chrono::{DateTime, Utc};

use super::types::{Emotion, LevelUp};

/// Days after a review during which no decay applies.
pub const GRACE_PERIOD_DAYS: i64 = 3;

/// Understanding never decays below this once it is positive.
pub const RESIDUAL_FLOOR: f64 = 0.1;

/// A single decay pass removes at most this fraction of the current level.
pub const MAX_DECAY_FRACTION: f64 = 0.8;

/// Understanding level at which a concept counts as mastered.
pub const MASTERY_THRESHOLD: f64 = 0.7;

/// XP paid once per concept on first reaching mastery.
pub const MASTERY_BONUS_XP: u64 = 50;

/// Cumulative XP required to reach each level, indexed by level.
pub const DEFAULT_LEVEL_THRESHOLDS: [u64; 6] = [0, 100, 300, 600, 1000, 1500];

/// Whole days elapsed between `last_reviewed` and `now`, never negative.
#[must_use]
pub fn days_since(last_reviewed: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_reviewed).num_days().max(0)
}

/// Returns true once the grace period has fully elapsed.
#[must_use]
pub fn should_decay(last_reviewed: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    days_since(last_reviewed, now) > GRACE_PERIOD_DAYS
}

/// [`should_decay`] against the current time.
#[must_use]
pub fn should_decay_now(last_reviewed: DateTime<Utc>) -> bool {
    should_decay(last_reviewed, Utc::now())
}

/// Per-day decay rate for the band `days` falls into.
fn decay_rate(days: i64) -> f64 {
    match days {
        d if d <= 7 => 0.05,
        d if d <= 14 => 0.10,
        _ => 0.15,
    }
}

/// Decay-correct `current_level` for the time elapsed since `last_reviewed`.
///
/// Forgetting accelerates with time: 5%/day up to a week, 10%/day up to two
/// weeks, 15%/day beyond that, counted only after the grace period. One pass
/// removes at most 80% of the current level, and a positive level never drops
/// below [`RESIDUAL_FLOOR`]. Non-positive levels are returned unchanged.
#[must_use]
pub fn apply_decay(last_reviewed: DateTime<Utc>, current_level: f64, now: DateTime<Utc>) -> f64 {
    let days = days_since(last_reviewed, now);
    if days <= GRACE_PERIOD_DAYS || current_level <= 0.0 {
        return current_level;
    }

    #[allow(clippy::cast_precision_loss)]
    let days_to_decay = (days - GRACE_PERIOD_DAYS) as f64;
    let total_decay = (current_level * decay_rate(days) * days_to_decay)
        .min(current_level * MAX_DECAY_FRACTION);

    (current_level - total_decay).max(RESIDUAL_FLOOR)
}

/// [`apply_decay`] against the current time.
#[must_use]
pub fn apply_decay_now(last_reviewed: DateTime<Utc>, current_level: f64) -> f64 {
    apply_decay(last_reviewed, current_level, Utc::now())
}

/// Add `delta` to `current_level`, saturating at both ends of `[0, 1]`.
#[must_use]
pub fn apply_interaction_delta(current_level: f64, delta: f64) -> f64 {
    (current_level + delta).clamp(0.0, 1.0)
}

/// XP earned for the student's reaction to one teaching turn.
#[must_use]
pub fn xp_for_emotion(emotion: Emotion) -> u64 {
    match emotion {
        Emotion::Excited => 10,
        Emotion::Understanding => 5,
        Emotion::Neutral => 2,
        Emotion::Confused | Emotion::Unknown => 0,
    }
}

/// [`MASTERY_BONUS_XP`] when the level crosses [`MASTERY_THRESHOLD`] upward, else 0.
#[must_use]
pub fn mastery_bonus(previous_level: f64, new_level: f64) -> u64 {
    if previous_level < MASTERY_THRESHOLD && new_level >= MASTERY_THRESHOLD {
        MASTERY_BONUS_XP
    } else {
        0
    }
}

/// Advance at most one level if `total_xp` reaches the next threshold.
#[must_use]
pub fn check_level_up(total_xp: u64, current_level: u32, thresholds: &[u64]) -> LevelUp {
    let next = current_level as usize + 1;
    match thresholds.get(next) {
        Some(&required) if total_xp >= required => LevelUp {
            new_level: current_level + 1,
            leveled_up: true,
        },
        _ => LevelUp {
            new_level: current_level,
            leveled_up: false,
        },
    }
}

/// Repeat [`check_level_up`] until no further threshold is crossed.
///
/// For lump-sum awards that may span several levels at once.
#[must_use]
pub fn settle_levels(total_xp: u64, current_level: u32, thresholds: &[u64]) -> LevelUp {
    let mut level = current_level;
    loop {
        let step = check_level_up(total_xp, level, thresholds);
        if !step.leveled_up {
            break;
        }
        level = step.new_level;
    }
    LevelUp {
        new_level: level,
        leveled_up: level > current_level,
    }
}

/// XP still needed to reach the next level, or `None` at the top level.
#[must_use]
pub fn xp_to_next_level(total_xp: u64, current_level: u32, thresholds: &[u64]) -> Option<u64> {
    thresholds
        .get(current_level as usize + 1)
        .map(|required| required.saturating_sub(total_xp))
}
