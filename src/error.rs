//! Error types for the scheduling core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("card {card_id} is already in the deck of learner {learner_id}")]
    Duplicate { learner_id: String, card_id: String },

    #[error("learner {learner_id} has no item for card {card_id}")]
    ItemNotFound { learner_id: String, card_id: String },

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Learner not found: {0}")]
    LearnerNotFound(String),

    #[error("unrecognised answer {0:?} (expected right or wrong)")]
    InvalidOutcome(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
