//! A learner's deck: membership, bucket queries and answer recording.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Card, Item, ItemState, Outcome};
use crate::query::{Bucket, DeckQuery, Order, Selection};
use crate::scheduler::Strategy;
use crate::storage::Repository;

/// Counts per bucket for one deck.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeckStats {
    pub total: usize,
    pub untested: usize,
    pub known: usize,
    pub failed: usize,
    pub expired: usize,
    pub review: usize,
    pub mastered: usize,
}

/// One learner's view over their items.
///
/// The deck borrows the repository mutably for its lifetime, so a single
/// handle owns all writes for the learner while the deck is alive.
pub struct Deck<'r, R: Repository + ?Sized> {
    repo: &'r mut R,
    learner_id: String,
    strategy: Arc<dyn Strategy>,
    now: Option<DateTime<Utc>>,
}

impl<'r, R: Repository + ?Sized> Deck<'r, R> {
    pub fn new(repo: &'r mut R, learner_id: impl Into<String>, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            repo,
            learner_id: learner_id.into(),
            strategy,
            now: None,
        }
    }

    /// Pin the deck's clock to `now`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Pin the clock, or pass `None` to follow the system clock again.
    pub fn set_now(&mut self, now: Option<DateTime<Utc>>) {
        self.now = now;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// Swap the scheduling strategy. Existing items keep their state; only
    /// later answers and queries use the new strategy.
    pub fn set_strategy(&mut self, strategy: Arc<dyn Strategy>) {
        debug!(from = self.strategy.name(), to = strategy.name(), "strategy changed");
        self.strategy = strategy;
    }

    pub fn repository(&self) -> &R {
        &*self.repo
    }

    // ══════════════════════════════════════════════════════════════════════
    // Membership
    // ══════════════════════════════════════════════════════════════════════

    /// Add an existing card to the deck as a new, untested item.
    pub fn add(&mut self, card_id: &str) -> Result<Item> {
        if self.repo.find_learner(&self.learner_id)?.is_none() {
            return Err(Error::LearnerNotFound(self.learner_id.clone()));
        }
        if self.repo.find_card(card_id)?.is_none() {
            return Err(Error::CardNotFound(card_id.to_string()));
        }

        let item = self
            .repo
            .create_item(&self.learner_id, card_id, ItemState::default())?;
        info!(learner_id = %self.learner_id, card_id, "card added to deck");
        Ok(item)
    }

    /// Store `card` and add it to the deck.
    pub fn add_card(&mut self, card: &Card) -> Result<Item> {
        self.repo.save_card(card)?;
        self.add(&card.id)
    }

    /// Drop the card's item from the deck. The card itself is untouched.
    /// Removing a card that is not in the deck is a no-op returning `false`.
    pub fn remove(&mut self, card_id: &str) -> Result<bool> {
        let removed = self.repo.delete_item(&self.learner_id, card_id)?;
        if removed {
            info!(learner_id = %self.learner_id, card_id, "card removed from deck");
        }
        Ok(removed)
    }

    pub fn item(&self, card_id: &str) -> Result<Option<Item>> {
        self.repo.find_item(&self.learner_id, card_id)
    }

    pub fn contains(&self, card_id: &str) -> Result<bool> {
        Ok(self.item(card_id)?.is_some())
    }

    /// All cards in insertion order.
    pub fn cards(&self) -> Result<Vec<Card>> {
        self.all().cards()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.repo.list_items(&self.learner_id)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The most recently added card.
    pub fn last(&self) -> Result<Option<Card>> {
        Ok(self.all().cards()?.pop())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Queries
    // ══════════════════════════════════════════════════════════════════════

    fn query(&self, selection: Selection) -> DeckQuery<'_, R> {
        DeckQuery::new(
            &*self.repo,
            &self.learner_id,
            self.strategy.as_ref(),
            self.now(),
            selection,
        )
    }

    pub fn all(&self) -> DeckQuery<'_, R> {
        self.query(Selection::All)
    }

    pub fn bucket(&self, bucket: Bucket) -> DeckQuery<'_, R> {
        self.query(Selection::Bucket(bucket))
    }

    pub fn untested(&self) -> DeckQuery<'_, R> {
        self.bucket(Bucket::Untested)
    }

    pub fn known(&self) -> DeckQuery<'_, R> {
        self.bucket(Bucket::Known)
    }

    pub fn failed(&self) -> DeckQuery<'_, R> {
        self.bucket(Bucket::Failed)
    }

    pub fn expired(&self) -> DeckQuery<'_, R> {
        self.bucket(Bucket::Expired)
    }

    /// Untested, failed and expired cards: everything that needs attention now.
    pub fn review(&self) -> DeckQuery<'_, R> {
        self.query(Selection::Review)
    }

    /// Known cards sitting at the strategy's terminal level.
    pub fn mastered(&self) -> DeckQuery<'_, R> {
        self.query(Selection::Mastered)
    }

    /// The card to study next, or `None` when nothing needs review.
    pub fn next(&self) -> Result<Option<Card>> {
        self.review().order(Order::Due).first()
    }

    pub fn stats(&self) -> Result<DeckStats> {
        let now = self.now();
        let strategy = self.strategy.as_ref();
        let mut stats = DeckStats::default();

        for item in self.repo.list_items(&self.learner_id)? {
            stats.total += 1;
            match Bucket::classify(&item.state, strategy, now) {
                Bucket::Untested => stats.untested += 1,
                Bucket::Known => {
                    stats.known += 1;
                    if strategy.is_mastered(item.state.progress_level) {
                        stats.mastered += 1;
                    }
                }
                Bucket::Failed => stats.failed += 1,
                Bucket::Expired => stats.expired += 1,
            }
        }
        stats.review = stats.untested + stats.failed + stats.expired;

        Ok(stats)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Answers
    // ══════════════════════════════════════════════════════════════════════

    /// Apply an answer to the card's item and persist it.
    ///
    /// Fails with [`Error::ItemNotFound`] if the card is not (or no longer)
    /// in the deck; nothing is written in that case.
    pub fn record_answer(&mut self, card_id: &str, outcome: Outcome) -> Result<Item> {
        let now = self.now();
        let mut item = self
            .repo
            .find_item(&self.learner_id, card_id)?
            .ok_or_else(|| Error::ItemNotFound {
                learner_id: self.learner_id.clone(),
                card_id: card_id.to_string(),
            })?;

        let before = item.state.progress_level;
        item.record_answer(self.strategy.as_ref(), outcome, now);
        self.repo.save_item(&item)?;

        debug!(
            learner_id = %self.learner_id,
            card_id,
            %outcome,
            strategy = self.strategy.name(),
            from = before,
            to = item.state.progress_level,
            due_at = ?item.state.due_at,
            "answer recorded"
        );
        Ok(item)
    }

    pub fn right_answer_for(&mut self, card_id: &str) -> Result<Item> {
        self.record_answer(card_id, Outcome::Correct)
    }

    pub fn wrong_answer_for(&mut self, card_id: &str) -> Result<Item> {
        self.record_answer(card_id, Outcome::Incorrect)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Teardown
    // ══════════════════════════════════════════════════════════════════════

    /// Destroy the learner and every item they own. Cards are kept.
    /// Returns how many items were removed.
    pub fn destroy(self) -> Result<usize> {
        let removed = self.repo.delete_all_items(&self.learner_id)?;
        self.repo.delete_learner(&self.learner_id)?;
        info!(learner_id = %self.learner_id, removed, "learner destroyed");
        Ok(removed)
    }
}
