//! Bucket classification and chainable deck queries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Card, Item, ItemState, LastResult};
use crate::scheduler::Strategy;
use crate::storage::Repository;

/// The four disjoint groups every item of a deck falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Never answered.
    Untested,
    /// Answered right often enough and not due yet.
    Known,
    /// Last answer was wrong.
    Failed,
    /// Last answer was right but the interval has run out.
    Expired,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Self::Untested, Self::Known, Self::Failed, Self::Expired];

    /// Place an item in exactly one bucket.
    ///
    /// The checks run in order, so the buckets partition every item set for
    /// any `now`: untested first, then known (tested, at or above the
    /// strategy's threshold and not yet due), then failed or expired by the
    /// last answer.
    ///
    /// The threshold belongs to the strategy passed in, not the one that
    /// scheduled the item. After a swap to a strategy with a higher floor, a
    /// not-yet-due item below the new threshold classifies as expired (or
    /// failed) and so comes back for review early.
    pub fn classify(state: &ItemState, strategy: &dyn Strategy, now: DateTime<Utc>) -> Self {
        let Some(due) = state.due_at else {
            return Self::Untested;
        };
        if due > now && state.progress_level >= strategy.known_threshold() {
            Self::Known
        } else if state.last_result == LastResult::Incorrect {
            Self::Failed
        } else {
            Self::Expired
        }
    }

    /// Whether items in this bucket need the learner's attention now.
    pub fn needs_review(&self) -> bool {
        !matches!(self, Self::Known)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Untested => "untested",
            Self::Known => "known",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Which items a query starts from, before any card filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Bucket(Bucket),
    /// Untested, failed and expired.
    Review,
    /// Known items at the strategy's terminal level.
    Mastered,
}

impl Selection {
    fn admits(&self, bucket: Bucket, state: &ItemState, strategy: &dyn Strategy) -> bool {
        match self {
            Self::All => true,
            Self::Bucket(b) => *b == bucket,
            Self::Review => bucket.needs_review(),
            Self::Mastered => bucket == Bucket::Known && strategy.is_mastered(state.progress_level),
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// The order cards were added in.
    #[default]
    Insertion,
    /// Earliest due first, untested before everything; ties by insertion.
    Due,
    CardId,
}

/// One item together with its card and bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckEntry {
    pub item: Item,
    pub card: Card,
    pub bucket: Bucket,
}

type CardFilter<'d> = Box<dyn Fn(&Card) -> bool + 'd>;

/// A lazily evaluated view over a learner's items.
///
/// Built by the bucket methods on [`crate::Deck`]. Filters only ever narrow
/// the starting selection; nothing touches the repository until one of the
/// materialising methods (`entries`, `cards`, `count`, ...) runs.
pub struct DeckQuery<'d, R: Repository + ?Sized> {
    repo: &'d R,
    learner_id: &'d str,
    strategy: &'d dyn Strategy,
    now: DateTime<Utc>,
    selection: Selection,
    filters: Vec<CardFilter<'d>>,
    order: Order,
    limit: Option<usize>,
}

impl<'d, R: Repository + ?Sized> DeckQuery<'d, R> {
    pub(crate) fn new(
        repo: &'d R,
        learner_id: &'d str,
        strategy: &'d dyn Strategy,
        now: DateTime<Utc>,
        selection: Selection,
    ) -> Self {
        Self {
            repo,
            learner_id,
            strategy,
            now,
            selection,
            filters: Vec::new(),
            order: Order::default(),
            limit: None,
        }
    }

    /// Keep only cards matching `pred`. Filters combine with AND.
    pub fn filter<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Card) -> bool + 'd,
    {
        self.filters.push(Box::new(pred));
        self
    }

    pub fn tagged(self, tag: &str) -> Self {
        let tag = tag.to_string();
        self.filter(move |card| card.has_tag(&tag))
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Classify relative to `now` instead of the deck's clock.
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Run the query.
    pub fn entries(&self) -> Result<Vec<DeckEntry>> {
        let mut entries = Vec::new();

        for item in self.repo.list_items(self.learner_id)? {
            let bucket = Bucket::classify(&item.state, self.strategy, self.now);
            if !self.selection.admits(bucket, &item.state, self.strategy) {
                continue;
            }

            let Some(card) = self.repo.find_card(&item.card_id)? else {
                tracing::warn!(card_id = %item.card_id, "item points at a missing card");
                continue;
            };
            if self.filters.iter().all(|f| f(&card)) {
                entries.push(DeckEntry { item, card, bucket });
            }
        }

        match self.order {
            Order::Insertion => entries.sort_by_key(|e| e.item.position),
            Order::Due => entries.sort_by(|a, b| {
                a.item
                    .state
                    .due_at
                    .cmp(&b.item.state.due_at)
                    .then(a.item.position.cmp(&b.item.position))
            }),
            Order::CardId => entries.sort_by(|a, b| a.card.id.cmp(&b.card.id)),
        }

        if let Some(n) = self.limit {
            entries.truncate(n);
        }

        tracing::debug!(
            learner_id = self.learner_id,
            selection = ?self.selection,
            matched = entries.len(),
            "deck query"
        );
        Ok(entries)
    }

    pub fn cards(&self) -> Result<Vec<Card>> {
        Ok(self.entries()?.into_iter().map(|e| e.card).collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    pub fn contains(&self, card_id: &str) -> Result<bool> {
        Ok(self.entries()?.iter().any(|e| e.card.id == card_id))
    }

    pub fn first(&self) -> Result<Option<Card>> {
        Ok(self.entries()?.into_iter().next().map(|e| e.card))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use crate::scheduler::{FibonacciSequence, LeitnerSystem};
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sample_states(strategy: &dyn Strategy) -> Vec<ItemState> {
        let start = now() - Duration::days(40);
        let mut states = vec![ItemState::default()];
        let mut state = ItemState::default();
        let mut at = start;
        for i in 0..12 {
            let outcome = if i % 4 == 3 { Outcome::Incorrect } else { Outcome::Correct };
            state = strategy.advance(&state, outcome, at);
            states.push(state.clone());
            at += Duration::days(3);
        }
        // a level stuck below the threshold with a future due date
        states.push(ItemState {
            progress_level: 0,
            due_at: Some(now() + Duration::days(2)),
            last_result: LastResult::Correct,
            ..Default::default()
        });
        states
    }

    #[test]
    fn every_state_lands_in_exactly_one_bucket() {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(LeitnerSystem::default()),
            Box::new(FibonacciSequence::default()),
        ];
        for strategy in &strategies {
            for state in sample_states(strategy.as_ref()) {
                for offset in [-50, -1, 0, 1, 50] {
                    let at = now() + Duration::days(offset);
                    let bucket = Bucket::classify(&state, strategy.as_ref(), at);
                    let hits = Bucket::ALL
                        .iter()
                        .filter(|b| Selection::Bucket(**b).admits(bucket, &state, strategy.as_ref()))
                        .count();
                    assert_eq!(hits, 1);
                    assert_eq!(
                        Selection::Review.admits(bucket, &state, strategy.as_ref()),
                        bucket != Bucket::Known
                    );
                }
            }
        }
    }

    #[test]
    fn reachable_states_match_bucket_definitions() {
        let leitner = LeitnerSystem::default();
        let right = leitner.advance(&ItemState::default(), Outcome::Correct, now());
        let wrong = leitner.advance(&right, Outcome::Incorrect, now());

        assert_eq!(Bucket::classify(&ItemState::default(), &leitner, now()), Bucket::Untested);
        assert_eq!(Bucket::classify(&right, &leitner, now()), Bucket::Known);
        assert_eq!(
            Bucket::classify(&right, &leitner, now() + Duration::days(1)),
            Bucket::Expired
        );
        assert_eq!(Bucket::classify(&wrong, &leitner, now()), Bucket::Failed);
        assert_eq!(
            Bucket::classify(&wrong, &leitner, now() + Duration::days(9)),
            Bucket::Failed
        );
    }

    #[test]
    fn untested_ignores_progress_level() {
        let state = ItemState {
            progress_level: 4,
            ..Default::default()
        };
        let leitner = LeitnerSystem::default();
        assert_eq!(Bucket::classify(&state, &leitner, now()), Bucket::Untested);
    }

    #[test]
    fn item_below_a_swapped_in_threshold_is_expired() {
        let leitner = LeitnerSystem::default();
        let right = leitner.advance(&ItemState::default(), Outcome::Correct, now());
        assert_eq!(Bucket::classify(&right, &leitner, now()), Bucket::Known);

        let floored = FibonacciSequence::new(2, 6).unwrap();
        assert!(right.due_at.unwrap() > now());
        assert_eq!(Bucket::classify(&right, &floored, now()), Bucket::Expired);
        assert!(Selection::Review.admits(Bucket::Expired, &right, &floored));

        let wrong = leitner.advance(&right, Outcome::Incorrect, now());
        let later = Bucket::classify(&wrong, &floored, now() - Duration::days(1));
        assert_eq!(later, Bucket::Failed);
    }
}
