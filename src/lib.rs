//! Spaced repetition scheduling core.
//!
//! Decide when a learner should see a card again, based on how they answered
//! it before. A [`Deck`] is one learner's view over their cards; it sorts every
//! card into exactly one of four buckets (untested, known, failed, expired) and
//! hands out the next card to review. Answers go through a pluggable
//! [`Strategy`] ([`LeitnerSystem`] or [`FibonacciSequence`]) and are persisted
//! through a [`Repository`].
//!
//! ```
//! use std::sync::Arc;
//! use srl_recall::{Card, Deck, Learner, LeitnerSystem, MemoryRepository, Repository};
//!
//! let mut repo = MemoryRepository::new();
//! let learner = Learner::new("Robert");
//! repo.save_learner(&learner).unwrap();
//!
//! let mut deck = Deck::new(&mut repo, learner.id.clone(), Arc::new(LeitnerSystem::default()));
//! let card = Card::new("日本語", "Japanese language");
//! deck.add_card(&card).unwrap();
//!
//! let next = deck.next().unwrap().unwrap();
//! deck.right_answer_for(&next.id).unwrap();
//! assert!(deck.next().unwrap().is_none());
//! ```

pub mod config;
pub mod deck;
pub mod error;
pub mod models;
pub mod query;
pub mod scheduler;
pub mod storage;

pub use config::Config;
pub use deck::{Deck, DeckStats};
pub use error::{Error, Result};
pub use models::{Card, Item, ItemState, LastResult, Learner, Outcome};
pub use query::{Bucket, DeckEntry, DeckQuery, Order, Selection};
pub use scheduler::{Algorithm, FibonacciSequence, LeitnerSystem, Strategy};
pub use storage::{import_csv, Backup, MemoryRepository, Repository, SqliteRepository};
