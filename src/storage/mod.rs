//! Storage of learners, cards and review items.
//!
//! The scheduling core only talks to storage through [`Repository`]. Two
//! implementations ship with the crate:
//!
//! - [`MemoryRepository`]: plain hash maps, for tests and embedding hosts
//! - [`SqliteRepository`]: a single SQLite file, used by the `srl` binary

mod backup;
mod sqlite;

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{Card, Item, ItemState, Learner};

pub use backup::{import_csv, Backup};
pub use sqlite::SqliteRepository;

/// Narrow storage interface consumed by [`crate::Deck`].
///
/// Reads take `&self`, writes take `&mut self`. Every write is atomic: a
/// failed call leaves no partial state behind.
pub trait Repository {
    fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>>;
    fn list_learners(&self) -> Result<Vec<Learner>>;
    /// Insert or replace a learner.
    fn save_learner(&mut self, learner: &Learner) -> Result<()>;
    /// Remove a learner row. Returns whether it existed.
    fn delete_learner(&mut self, learner_id: &str) -> Result<bool>;

    fn find_card(&self, card_id: &str) -> Result<Option<Card>>;
    fn list_cards(&self) -> Result<Vec<Card>>;
    /// Insert or replace a card.
    fn save_card(&mut self, card: &Card) -> Result<()>;

    fn find_item(&self, learner_id: &str, card_id: &str) -> Result<Option<Item>>;
    /// Create the item for `(learner_id, card_id)`, assigning the next insertion
    /// position. Fails with [`Error::Duplicate`] if it already exists.
    fn create_item(&mut self, learner_id: &str, card_id: &str, state: ItemState) -> Result<Item>;
    /// Persist a mutated item. Fails with [`Error::ItemNotFound`] if it was deleted.
    fn save_item(&mut self, item: &Item) -> Result<()>;
    /// Returns whether an item was removed.
    fn delete_item(&mut self, learner_id: &str, card_id: &str) -> Result<bool>;
    /// All items of a learner, in no particular order.
    fn list_items(&self, learner_id: &str) -> Result<Vec<Item>>;
    /// Returns how many items were removed.
    fn delete_all_items(&mut self, learner_id: &str) -> Result<usize>;
}

// ══════════════════════════════════════════════════════════════════════════
// In-memory repository
// ══════════════════════════════════════════════════════════════════════════

type ItemKey = (String, String);

fn key(learner_id: &str, card_id: &str) -> ItemKey {
    (learner_id.to_string(), card_id.to_string())
}

/// Keeps everything in hash maps.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    learners: HashMap<String, Learner>,
    cards: HashMap<String, Card>,
    items: HashMap<ItemKey, Item>,
    last_position: u64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>> {
        Ok(self.learners.get(learner_id).cloned())
    }

    fn list_learners(&self) -> Result<Vec<Learner>> {
        let mut learners: Vec<Learner> = self.learners.values().cloned().collect();
        learners.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(learners)
    }

    fn save_learner(&mut self, learner: &Learner) -> Result<()> {
        self.learners.insert(learner.id.clone(), learner.clone());
        Ok(())
    }

    fn delete_learner(&mut self, learner_id: &str) -> Result<bool> {
        Ok(self.learners.remove(learner_id).is_some())
    }

    fn find_card(&self, card_id: &str) -> Result<Option<Card>> {
        Ok(self.cards.get(card_id).cloned())
    }

    fn list_cards(&self) -> Result<Vec<Card>> {
        let mut cards: Vec<Card> = self.cards.values().cloned().collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(cards)
    }

    fn save_card(&mut self, card: &Card) -> Result<()> {
        self.cards.insert(card.id.clone(), card.clone());
        Ok(())
    }

    fn find_item(&self, learner_id: &str, card_id: &str) -> Result<Option<Item>> {
        Ok(self.items.get(&key(learner_id, card_id)).cloned())
    }

    fn create_item(&mut self, learner_id: &str, card_id: &str, state: ItemState) -> Result<Item> {
        let k = key(learner_id, card_id);
        if self.items.contains_key(&k) {
            return Err(Error::Duplicate {
                learner_id: learner_id.to_string(),
                card_id: card_id.to_string(),
            });
        }

        self.last_position += 1;
        let item = Item {
            learner_id: learner_id.to_string(),
            card_id: card_id.to_string(),
            position: self.last_position,
            state,
            added_at: Utc::now(),
        };
        self.items.insert(k, item.clone());
        Ok(item)
    }

    fn save_item(&mut self, item: &Item) -> Result<()> {
        match self.items.get_mut(&key(&item.learner_id, &item.card_id)) {
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(Error::ItemNotFound {
                learner_id: item.learner_id.clone(),
                card_id: item.card_id.clone(),
            }),
        }
    }

    fn delete_item(&mut self, learner_id: &str, card_id: &str) -> Result<bool> {
        Ok(self.items.remove(&key(learner_id, card_id)).is_some())
    }

    fn list_items(&self, learner_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .items
            .values()
            .filter(|item| item.learner_id == learner_id)
            .cloned()
            .collect())
    }

    fn delete_all_items(&mut self, learner_id: &str) -> Result<usize> {
        let before = self.items.len();
        self.items.retain(|(owner, _), _| owner != learner_id);
        Ok(before - self.items.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Contract checks every repository implementation must pass.
    pub(crate) fn exercise_repository<R: Repository>(repo: &mut R) {
        let learner = Learner::new("Robert");
        let other = Learner::new("Alice");
        let card = Card::new("日本語", "Japanese language").with_tag("n5");
        let second = Card::new("日本語1", "Japanese language");
        repo.save_learner(&learner).unwrap();
        repo.save_learner(&other).unwrap();
        repo.save_card(&card).unwrap();
        repo.save_card(&second).unwrap();

        assert_eq!(repo.find_learner(&learner.id).unwrap(), Some(learner.clone()));
        assert_eq!(repo.find_card(&card.id).unwrap(), Some(card.clone()));
        assert_eq!(repo.find_card("missing").unwrap(), None);
        assert_eq!(repo.list_cards().unwrap().len(), 2);
        assert_eq!(repo.list_learners().unwrap().len(), 2);

        let first = repo.create_item(&learner.id, &card.id, ItemState::default()).unwrap();
        let next = repo.create_item(&learner.id, &second.id, ItemState::default()).unwrap();
        assert!(next.position > first.position);
        repo.create_item(&other.id, &card.id, ItemState::default()).unwrap();

        let dup = repo.create_item(&learner.id, &card.id, ItemState::default());
        assert!(matches!(dup, Err(Error::Duplicate { .. })));

        let mut item = repo.find_item(&learner.id, &card.id).unwrap().unwrap();
        item.state.progress_level = 3;
        item.state.due_at = Some(Utc::now());
        item.state.times_right = 3;
        repo.save_item(&item).unwrap();
        let stored = repo.find_item(&learner.id, &card.id).unwrap().unwrap();
        assert_eq!(stored.state.progress_level, 3);
        assert_eq!(stored.state.times_right, 3);
        assert!(stored.state.due_at.is_some());

        assert_eq!(repo.list_items(&learner.id).unwrap().len(), 2);
        assert!(repo.delete_item(&learner.id, &second.id).unwrap());
        assert!(!repo.delete_item(&learner.id, &second.id).unwrap());

        let gone = Item { card_id: second.id.clone(), ..stored.clone() };
        assert!(matches!(repo.save_item(&gone), Err(Error::ItemNotFound { .. })));

        assert_eq!(repo.delete_all_items(&learner.id).unwrap(), 1);
        assert!(repo.list_items(&learner.id).unwrap().is_empty());
        assert_eq!(repo.list_items(&other.id).unwrap().len(), 1);
        assert!(repo.delete_learner(&learner.id).unwrap());
        assert_eq!(repo.find_learner(&learner.id).unwrap(), None);
        assert_eq!(repo.list_cards().unwrap().len(), 2);
    }

    #[test]
    fn memory_repository_contract() {
        exercise_repository(&mut MemoryRepository::new());
    }
}
