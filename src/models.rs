//! Data models for cards, learners and their review items.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::scheduler::Strategy;

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Whether the learner recalled a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Incorrect,
}

impl Outcome {
    pub fn from_key(c: char) -> Option<Self> {
        match c {
            'y' | 'Y' | '1' => Some(Self::Correct),
            'n' | 'N' | '0' => Some(Self::Incorrect),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Correct => "right",
            Self::Incorrect => "wrong",
        }
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "right" | "correct" | "yes" | "y" => Ok(Self::Correct),
            "wrong" | "incorrect" | "no" | "n" => Ok(Self::Incorrect),
            _ => Err(Error::InvalidOutcome(s.to_string())),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of the most recent answer recorded for an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastResult {
    #[default]
    None,
    Correct,
    Incorrect,
}

impl LastResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
        }
    }

    /// Inverse of [`LastResult::as_str`]; unknown text maps to `None`.
    pub fn parse(s: &str) -> Self {
        match s {
            "correct" => Self::Correct,
            "incorrect" => Self::Incorrect,
            _ => Self::None,
        }
    }
}

impl From<Outcome> for LastResult {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Correct => Self::Correct,
            Outcome::Incorrect => Self::Incorrect,
        }
    }
}

/// A single flashcard. The scheduling core never mutates cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub front: String,
    pub back: String,

    // Metadata
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            front: front.into(),
            back: back.into(),
            tags: Vec::new(),
            notes: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Someone studying cards. Owns at most one item per card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learner {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Learner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Scheduling state of one item, as produced by a [`Strategy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    /// Leitner box or Fibonacci step, depending on the strategy.
    pub progress_level: u32,
    /// `None` until the first answer is recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    pub consecutive_correct: u32,
    #[serde(default)]
    pub last_result: LastResult,

    // Tracking
    #[serde(default)]
    pub times_right: u32,
    #[serde(default)]
    pub times_wrong: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl ItemState {
    pub fn is_untested(&self) -> bool {
        self.due_at.is_none()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.due_at {
            None => true,
            Some(due) => due <= now,
        }
    }
}

/// Progress of one learner on one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub learner_id: String,
    pub card_id: String,
    /// Insertion sequence assigned by the repository.
    pub position: u64,
    #[serde(flatten)]
    pub state: ItemState,
    pub added_at: DateTime<Utc>,
}

impl Item {
    /// Apply an answer through `strategy`. Persisting the result is up to the caller.
    pub fn record_answer(&mut self, strategy: &dyn Strategy, outcome: Outcome, now: DateTime<Utc>) {
        self.state = strategy.advance(&self.state, outcome, now);
    }
}
