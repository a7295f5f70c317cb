//! Scheduling strategies.
//!
//! A strategy maps an item's current [`ItemState`] and an answer [`Outcome`]
//! to the next state. Two are built in:
//!
//! - [`LeitnerSystem`]: a fixed row of boxes, each with its own interval.
//!   A right answer moves the card up one box, a wrong answer sends it back
//!   to box 0.
//! - [`FibonacciSequence`]: each right answer moves one step further along
//!   the Fibonacci sequence (1, 1, 2, 3, 5, 8, ... days).
//!
//! Both are pure: `now` is passed in and nothing is read from the clock.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{ItemState, LastResult, Outcome};

/// Default Leitner intervals in days, indexed by box. Box 0 is immediate.
pub const DEFAULT_LEITNER_INTERVALS: [u32; 6] = [0, 1, 3, 7, 14, 30];

/// Fibonacci step at which a card counts as mastered.
pub const DEFAULT_FIBONACCI_MASTERY: u32 = 5;

/// Longest interval any strategy hands out (about a century).
pub const MAX_INTERVAL_DAYS: u64 = 36_500;

/// A spaced repetition algorithm.
pub trait Strategy: fmt::Debug + Send + Sync {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Compute the state after answering. Never fails.
    fn advance(&self, state: &ItemState, outcome: Outcome, now: DateTime<Utc>) -> ItemState;

    /// Level a wrong answer resets to.
    fn floor(&self) -> u32;

    /// Lowest level at which a tested, not-yet-due item counts as known.
    ///
    /// This is the first level a right answer can reach, so every item whose
    /// last answer was right sits at or above it.
    fn known_threshold(&self) -> u32 {
        self.floor() + 1
    }

    /// Whether `level` is the strategy's terminal "mastered" level.
    fn is_mastered(&self, level: u32) -> bool;

    /// Time until an item at `level` is due again.
    fn interval(&self, level: u32) -> Duration;
}

/// `now + interval`, saturating at the latest representable instant.
fn due_after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    now.checked_add_signed(interval)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn days(n: u64) -> Duration {
    Duration::days(n.min(MAX_INTERVAL_DAYS) as i64)
}

/// Bookkeeping shared by every strategy once the new level is known.
fn answered(
    state: &ItemState,
    outcome: Outcome,
    level: u32,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ItemState {
    let mut next = state.clone();
    next.progress_level = level;
    next.due_at = Some(due_at);
    next.last_result = LastResult::from(outcome);
    next.last_reviewed_at = Some(now);
    match outcome {
        Outcome::Correct => {
            next.consecutive_correct = state.consecutive_correct.saturating_add(1);
            next.times_right = state.times_right.saturating_add(1);
        }
        Outcome::Incorrect => {
            next.consecutive_correct = 0;
            next.times_wrong = state.times_wrong.saturating_add(1);
        }
    }
    next
}

// ══════════════════════════════════════════════════════════════════════════
// Leitner System
// ══════════════════════════════════════════════════════════════════════════

/// Leitner boxes `0..=N`, where `N` is the last index of the interval table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeitnerSystem {
    intervals_days: Vec<u32>,
}

impl Default for LeitnerSystem {
    fn default() -> Self {
        Self {
            intervals_days: DEFAULT_LEITNER_INTERVALS.to_vec(),
        }
    }
}

impl LeitnerSystem {
    /// Build from a per-box interval table (days). The table needs at least
    /// two boxes and must be strictly increasing.
    pub fn new(intervals_days: Vec<u32>) -> Result<Self, Error> {
        if intervals_days.len() < 2 {
            return Err(Error::InvalidConfig(format!(
                "leitner needs at least two boxes, got {:?}",
                intervals_days
            )));
        }
        if intervals_days.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidConfig(format!(
                "leitner intervals must be strictly increasing: {:?}",
                intervals_days
            )));
        }
        Ok(Self { intervals_days })
    }

    /// Index of the last box.
    pub fn max_box(&self) -> u32 {
        (self.intervals_days.len() - 1) as u32
    }
}

impl Strategy for LeitnerSystem {
    fn name(&self) -> &'static str {
        "Leitner System"
    }

    fn advance(&self, state: &ItemState, outcome: Outcome, now: DateTime<Utc>) -> ItemState {
        // a never-tested item starts from box 0 whatever level it was stored with
        let base = if state.is_untested() { 0 } else { state.progress_level };
        let level = match outcome {
            Outcome::Correct => base.saturating_add(1).min(self.max_box()),
            Outcome::Incorrect => 0,
        };
        let due_at = match outcome {
            Outcome::Correct => due_after(now, self.interval(level)),
            Outcome::Incorrect => now,
        };
        answered(state, outcome, level, due_at, now)
    }

    fn floor(&self) -> u32 {
        0
    }

    fn is_mastered(&self, level: u32) -> bool {
        level >= self.max_box()
    }

    fn interval(&self, level: u32) -> Duration {
        let idx = (level as usize).min(self.intervals_days.len() - 1);
        days(self.intervals_days[idx] as u64)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Fibonacci Sequence
// ══════════════════════════════════════════════════════════════════════════

/// Intervals grow along the Fibonacci numbers, one step per right answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibonacciSequence {
    floor: u32,
    mastery_level: u32,
}

impl Default for FibonacciSequence {
    fn default() -> Self {
        Self {
            floor: 0,
            mastery_level: DEFAULT_FIBONACCI_MASTERY,
        }
    }
}

impl FibonacciSequence {
    /// `floor` is where a wrong answer drops the item; `mastery_level` must
    /// lie above it.
    pub fn new(floor: u32, mastery_level: u32) -> Result<Self, Error> {
        if mastery_level <= floor {
            return Err(Error::InvalidConfig(format!(
                "fibonacci mastery level {} must be above the floor {}",
                mastery_level, floor
            )));
        }
        Ok(Self {
            floor,
            mastery_level,
        })
    }
}

/// The `k`-th Fibonacci number (`fib(1) = fib(2) = 1`), capped at
/// [`MAX_INTERVAL_DAYS`].
pub fn fibonacci(k: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..k {
        if a >= MAX_INTERVAL_DAYS {
            return MAX_INTERVAL_DAYS;
        }
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a.min(MAX_INTERVAL_DAYS)
}

impl Strategy for FibonacciSequence {
    fn name(&self) -> &'static str {
        "Fibonacci Sequence"
    }

    fn advance(&self, state: &ItemState, outcome: Outcome, now: DateTime<Utc>) -> ItemState {
        match outcome {
            Outcome::Correct => {
                let base = if state.is_untested() {
                    self.floor
                } else {
                    state.progress_level.max(self.floor)
                };
                let level = base.saturating_add(1);
                answered(state, outcome, level, due_after(now, self.interval(level)), now)
            }
            Outcome::Incorrect => answered(state, outcome, self.floor, now, now),
        }
    }

    fn floor(&self) -> u32 {
        self.floor
    }

    fn is_mastered(&self, level: u32) -> bool {
        level >= self.mastery_level
    }

    fn interval(&self, level: u32) -> Duration {
        days(fibonacci(level))
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Algorithm selection
// ══════════════════════════════════════════════════════════════════════════

/// Names the built-in strategies in configuration files and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    LeitnerSystem,
    FibonacciSequence,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeitnerSystem => "leitner_system",
            Self::FibonacciSequence => "fibonacci_sequence",
        }
    }

    /// The strategy with its default parameters.
    pub fn default_strategy(&self) -> Arc<dyn Strategy> {
        match self {
            Self::LeitnerSystem => Arc::new(LeitnerSystem::default()),
            Self::FibonacciSequence => Arc::new(FibonacciSequence::default()),
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "leitner" | "leitner_system" => Ok(Self::LeitnerSystem),
            "fibonacci" | "fibonacci_sequence" => Ok(Self::FibonacciSequence),
            other => Err(Error::InvalidConfig(format!("unknown algorithm: {}", other))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn answer_n(strategy: &dyn Strategy, outcome: Outcome, n: usize) -> Vec<ItemState> {
        let mut state = ItemState::default();
        let mut now = t0();
        let mut out = Vec::new();
        for _ in 0..n {
            state = strategy.advance(&state, outcome, now);
            out.push(state.clone());
            now = state.due_at.unwrap();
        }
        out
    }

    #[test]
    fn test_leitner_first_correct_moves_to_box_one() {
        let leitner = LeitnerSystem::default();
        let next = leitner.advance(&ItemState::default(), Outcome::Correct, t0());

        assert_eq!(next.progress_level, 1);
        assert_eq!(next.due_at, Some(t0() + Duration::days(1)));
        assert_eq!(next.consecutive_correct, 1);
        assert_eq!(next.last_result, LastResult::Correct);
        assert_eq!(next.last_reviewed_at, Some(t0()));
    }

    #[test]
    fn test_first_correct_ignores_stored_level_of_untested_item() {
        let stale = ItemState {
            progress_level: 4,
            ..Default::default()
        };

        let leitner = LeitnerSystem::default();
        let next = leitner.advance(&stale, Outcome::Correct, t0());
        assert_eq!(next.progress_level, 1);
        assert_eq!(next.due_at, Some(t0() + Duration::days(1)));

        let fib = FibonacciSequence::default();
        assert_eq!(fib.advance(&stale, Outcome::Correct, t0()).progress_level, 1);

        let floored = FibonacciSequence::new(2, 6).unwrap();
        assert_eq!(floored.advance(&stale, Outcome::Correct, t0()).progress_level, 3);
    }

    #[test]
    fn test_leitner_clamps_at_last_box() {
        let leitner = LeitnerSystem::default();
        let states = answer_n(&leitner, Outcome::Correct, 10);

        let levels: Vec<u32> = states.iter().map(|s| s.progress_level).collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 5, 5, 5, 5, 5]);
        assert!(leitner.is_mastered(5));
        assert!(!leitner.is_mastered(4));
        assert_eq!(states[9].consecutive_correct, 10);
    }

    #[test]
    fn test_leitner_due_dates_never_shrink_on_success() {
        let leitner = LeitnerSystem::default();
        let states = answer_n(&leitner, Outcome::Correct, 8);
        for pair in states.windows(2) {
            assert!(pair[1].due_at >= pair[0].due_at);
        }
    }

    #[test]
    fn test_incorrect_resets_to_floor_and_due_now() {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(LeitnerSystem::default()),
            Box::new(FibonacciSequence::default()),
            Box::new(FibonacciSequence::new(2, 6).unwrap()),
        ];
        for strategy in strategies {
            let good = answer_n(strategy.as_ref(), Outcome::Correct, 4).pop().unwrap();
            let now = good.due_at.unwrap();
            let failed = strategy.advance(&good, Outcome::Incorrect, now);

            assert_eq!(failed.progress_level, strategy.floor(), "{}", strategy.name());
            assert!(failed.due_at.unwrap() <= now);
            assert_eq!(failed.consecutive_correct, 0);
            assert_eq!(failed.times_wrong, 1);
            assert_eq!(failed.times_right, 4);
            assert_eq!(failed.last_result, LastResult::Incorrect);
        }
    }

    #[test]
    fn test_fibonacci_numbers() {
        let seq: Vec<u64> = (1..=8).map(fibonacci).collect();
        assert_eq!(seq, vec![1, 1, 2, 3, 5, 8, 13, 21]);
        assert_eq!(fibonacci(0), 0);
        assert_eq!(fibonacci(200), MAX_INTERVAL_DAYS);
        assert_eq!(fibonacci(u32::MAX), MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_fibonacci_intervals_follow_sequence() {
        let fib = FibonacciSequence::default();
        let mut state = ItemState::default();
        let mut now = t0();
        let mut gaps = Vec::new();
        for _ in 0..6 {
            state = fib.advance(&state, Outcome::Correct, now);
            let due = state.due_at.unwrap();
            gaps.push((due - now).num_days());
            now = due;
        }
        assert_eq!(gaps, vec![1, 1, 2, 3, 5, 8]);
        assert_eq!(state.progress_level, 6);
        assert!(fib.is_mastered(state.progress_level));
    }

    #[test]
    fn test_fibonacci_floor_applies_to_first_answer() {
        let fib = FibonacciSequence::new(2, 5).unwrap();
        let next = fib.advance(&ItemState::default(), Outcome::Correct, t0());
        assert_eq!(next.progress_level, 3);
        assert_eq!(fib.known_threshold(), 3);
    }

    #[test]
    fn test_huge_levels_do_not_overflow() {
        let fib = FibonacciSequence::default();
        let state = ItemState {
            progress_level: u32::MAX,
            due_at: Some(t0()),
            ..Default::default()
        };
        let next = fib.advance(&state, Outcome::Correct, t0());
        assert_eq!(next.progress_level, u32::MAX);
        assert_eq!(next.due_at, Some(t0() + Duration::days(MAX_INTERVAL_DAYS as i64)));

        let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let next = fib.advance(&state, Outcome::Correct, late);
        assert_eq!(next.due_at, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_invalid_tables_are_rejected() {
        assert!(LeitnerSystem::new(vec![]).is_err());
        assert!(LeitnerSystem::new(vec![7]).is_err());
        assert!(LeitnerSystem::new(vec![0, 2, 2]).is_err());
        assert!(FibonacciSequence::new(3, 3).is_err());
        assert_eq!(LeitnerSystem::new(vec![0, 1]).unwrap().max_box(), 1);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("leitner".parse::<Algorithm>().unwrap(), Algorithm::LeitnerSystem);
        assert_eq!(
            "Fibonacci-Sequence".parse::<Algorithm>().unwrap(),
            Algorithm::FibonacciSequence
        );
        assert!("sm2".parse::<Algorithm>().is_err());
        assert_eq!(Algorithm::FibonacciSequence.to_string(), "fibonacci_sequence");
        assert_eq!(Algorithm::default().default_strategy().name(), "Leitner System");
    }
}
