//! Backups and card import.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Repository;
use crate::error::{Error, Result};
use crate::models::{Card, Item, Learner};

const BACKUP_VERSION: u32 = 1;

/// Backup format containing every learner, card and item in a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub learners: Vec<Learner>,
    pub cards: Vec<Card>,
    pub items: Vec<Item>,
}

impl Backup {
    /// Snapshot the whole repository.
    pub fn capture<R: Repository + ?Sized>(repo: &R) -> Result<Self> {
        let learners = repo.list_learners()?;
        let mut items = Vec::new();
        for learner in &learners {
            let mut owned = repo.list_items(&learner.id)?;
            owned.sort_by_key(|item| item.position);
            items.extend(owned);
        }

        Ok(Self {
            version: BACKUP_VERSION,
            created_at: Utc::now(),
            learners,
            cards: repo.list_cards()?,
            items,
        })
    }

    /// Load the backup into `repo`.
    /// Items that already exist are left alone.
    /// Returns (imported, skipped) item counts.
    ///
    /// Every item must name a learner and a card found in the backup or
    /// already in `repo`. That is checked before anything is written, so a
    /// backup with dangling items fails without touching `repo`. A storage
    /// error halfway through still leaves the rows written so far.
    pub fn restore<R: Repository + ?Sized>(&self, repo: &mut R) -> Result<(usize, usize)> {
        self.check_references(&*repo)?;

        for learner in &self.learners {
            if repo.find_learner(&learner.id)?.is_none() {
                repo.save_learner(learner)?;
            }
        }
        for card in &self.cards {
            if repo.find_card(&card.id)?.is_none() {
                repo.save_card(card)?;
            }
        }

        let mut imported = 0;
        let mut skipped = 0;

        for item in &self.items {
            if repo.find_item(&item.learner_id, &item.card_id)?.is_some() {
                skipped += 1;
            } else {
                repo.create_item(&item.learner_id, &item.card_id, item.state.clone())?;
                imported += 1;
            }
        }

        tracing::info!(imported, skipped, "backup restored");
        Ok((imported, skipped))
    }

    fn check_references<R: Repository + ?Sized>(&self, repo: &R) -> Result<()> {
        let learners: HashSet<&str> = self.learners.iter().map(|l| l.id.as_str()).collect();
        let cards: HashSet<&str> = self.cards.iter().map(|c| c.id.as_str()).collect();

        for item in &self.items {
            if !learners.contains(item.learner_id.as_str())
                && repo.find_learner(&item.learner_id)?.is_none()
            {
                return Err(Error::LearnerNotFound(item.learner_id.clone()));
            }
            if !cards.contains(item.card_id.as_str()) && repo.find_card(&item.card_id)?.is_none() {
                return Err(Error::CardNotFound(item.card_id.clone()));
            }
        }
        Ok(())
    }

    /// Export the backup to a file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let backup: Backup = serde_json::from_str(&json)?;
        if backup.version != BACKUP_VERSION {
            tracing::warn!(version = backup.version, "unexpected backup version");
        }
        Ok(backup)
    }
}

/// Read cards from a CSV file of `front,back` lines.
pub fn import_csv(csv_path: &Path) -> Result<Vec<Card>> {
    let content = fs::read_to_string(csv_path)?;
    let mut cards = Vec::new();

    for (i, line) in content.lines().enumerate() {
        // Skip header
        if i == 0 && line.to_lowercase().contains("front") {
            continue;
        }

        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() >= 2 {
            let front = parts[0].trim();
            let back = parts[1].trim();

            if !front.is_empty() && !back.is_empty() {
                cards.push(Card::new(front, back));
                continue;
            }
        }

        if !line.trim().is_empty() {
            tracing::warn!(line = i + 1, "skipping malformed csv line");
        }
    }

    Ok(cards)
}
