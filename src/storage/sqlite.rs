//! SQLite-backed repository.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Repository;
use crate::error::{Error, Result};
use crate::models::{Card, Item, ItemState, LastResult, Learner};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS learners (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cards (
    id          TEXT PRIMARY KEY,
    front       TEXT NOT NULL,
    back        TEXT NOT NULL,
    tags        TEXT NOT NULL DEFAULT '[]',
    notes       TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    learner_id          TEXT NOT NULL REFERENCES learners(id) ON DELETE CASCADE,
    card_id             TEXT NOT NULL REFERENCES cards(id),
    position            INTEGER NOT NULL,
    progress_level      INTEGER NOT NULL DEFAULT 0,
    due_at              TEXT,
    consecutive_correct INTEGER NOT NULL DEFAULT 0,
    last_result         TEXT NOT NULL DEFAULT 'none',
    times_right         INTEGER NOT NULL DEFAULT 0,
    times_wrong         INTEGER NOT NULL DEFAULT 0,
    last_reviewed_at    TEXT,
    added_at            TEXT NOT NULL,
    PRIMARY KEY (learner_id, card_id)
);

CREATE INDEX IF NOT EXISTS idx_items_learner_position ON items(learner_id, position);
";

const ITEM_COLUMNS: &str = "learner_id, card_id, position, progress_level, due_at, \
     consecutive_correct, last_result, times_right, times_wrong, last_reviewed_at, added_at";

/// Stores learners, cards and items in one SQLite database.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Get default database location.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("srl")
            .join("srl.db")
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("sqlite schema ready");
        Ok(Self { conn })
    }

    fn row_to_item(row: &Row) -> rusqlite::Result<Item> {
        let position: i64 = row.get(2)?;
        let last_result: String = row.get(6)?;
        Ok(Item {
            learner_id: row.get(0)?,
            card_id: row.get(1)?,
            position: position as u64,
            state: ItemState {
                progress_level: row.get(3)?,
                due_at: opt_timestamp(row, 4)?,
                consecutive_correct: row.get(5)?,
                last_result: LastResult::parse(&last_result),
                times_right: row.get(7)?,
                times_wrong: row.get(8)?,
                last_reviewed_at: opt_timestamp(row, 9)?,
            },
            added_at: timestamp(row, 10)?,
        })
    }

    fn row_to_card(row: &Row) -> rusqlite::Result<Card> {
        let tags: String = row.get(3)?;
        Ok(Card {
            id: row.get(0)?,
            front: row.get(1)?,
            back: row.get(2)?,
            tags: serde_json::from_str(&tags)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
            notes: row.get(4)?,
            created_at: timestamp(row, 5)?,
        })
    }

    fn row_to_learner(row: &Row) -> rusqlite::Result<Learner> {
        Ok(Learner {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: timestamp(row, 2)?,
        })
    }
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(idx, &text)
}

fn opt_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_timestamp(idx, &t)).transpose()
}

fn to_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl Repository for SqliteRepository {
    fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM learners WHERE id = ?1",
                params![learner_id],
                Self::row_to_learner,
            )
            .optional()?)
    }

    fn list_learners(&self) -> Result<Vec<Learner>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM learners ORDER BY created_at, id")?;
        let learners = stmt
            .query_map([], Self::row_to_learner)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(learners)
    }

    fn save_learner(&mut self, learner: &Learner) -> Result<()> {
        self.conn.execute(
            "INSERT INTO learners (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![learner.id, learner.name, to_text(&learner.created_at)],
        )?;
        Ok(())
    }

    fn delete_learner(&mut self, learner_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM learners WHERE id = ?1", params![learner_id])?;
        Ok(rows > 0)
    }

    fn find_card(&self, card_id: &str) -> Result<Option<Card>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, front, back, tags, notes, created_at FROM cards WHERE id = ?1",
                params![card_id],
                Self::row_to_card,
            )
            .optional()?)
    }

    fn list_cards(&self) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, front, back, tags, notes, created_at FROM cards ORDER BY created_at, id",
        )?;
        let cards = stmt
            .query_map([], Self::row_to_card)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    fn save_card(&mut self, card: &Card) -> Result<()> {
        let tags = serde_json::to_string(&card.tags)?;
        self.conn.execute(
            "INSERT INTO cards (id, front, back, tags, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                front = excluded.front, back = excluded.back,
                tags = excluded.tags, notes = excluded.notes",
            params![card.id, card.front, card.back, tags, card.notes, to_text(&card.created_at)],
        )?;
        Ok(())
    }

    fn find_item(&self, learner_id: &str, card_id: &str) -> Result<Option<Item>> {
        let sql = format!(
            "SELECT {} FROM items WHERE learner_id = ?1 AND card_id = ?2",
            ITEM_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![learner_id, card_id], Self::row_to_item)
            .optional()?)
    }

    fn create_item(&mut self, learner_id: &str, card_id: &str, state: ItemState) -> Result<Item> {
        let tx = self.conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE learner_id = ?1 AND card_id = ?2)",
            params![learner_id, card_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::Duplicate {
                learner_id: learner_id.to_string(),
                card_id: card_id.to_string(),
            });
        }

        let position: i64 =
            tx.query_row("SELECT COALESCE(MAX(position), 0) + 1 FROM items", [], |row| {
                row.get(0)
            })?;

        let item = Item {
            learner_id: learner_id.to_string(),
            card_id: card_id.to_string(),
            position: position as u64,
            state,
            added_at: Utc::now(),
        };

        tx.execute(
            &format!(
                "INSERT INTO items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                ITEM_COLUMNS
            ),
            params![
                item.learner_id,
                item.card_id,
                position,
                item.state.progress_level,
                item.state.due_at.as_ref().map(to_text),
                item.state.consecutive_correct,
                item.state.last_result.as_str(),
                item.state.times_right,
                item.state.times_wrong,
                item.state.last_reviewed_at.as_ref().map(to_text),
                to_text(&item.added_at),
            ],
        )?;
        tx.commit()?;

        Ok(item)
    }

    fn save_item(&mut self, item: &Item) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE items SET
                progress_level = ?3, due_at = ?4, consecutive_correct = ?5,
                last_result = ?6, times_right = ?7, times_wrong = ?8, last_reviewed_at = ?9
             WHERE learner_id = ?1 AND card_id = ?2",
            params![
                item.learner_id,
                item.card_id,
                item.state.progress_level,
                item.state.due_at.as_ref().map(to_text),
                item.state.consecutive_correct,
                item.state.last_result.as_str(),
                item.state.times_right,
                item.state.times_wrong,
                item.state.last_reviewed_at.as_ref().map(to_text),
            ],
        )?;

        if rows == 0 {
            return Err(Error::ItemNotFound {
                learner_id: item.learner_id.clone(),
                card_id: item.card_id.clone(),
            });
        }
        Ok(())
    }

    fn delete_item(&mut self, learner_id: &str, card_id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM items WHERE learner_id = ?1 AND card_id = ?2",
            params![learner_id, card_id],
        )?;
        Ok(rows > 0)
    }

    fn list_items(&self, learner_id: &str) -> Result<Vec<Item>> {
        let sql = format!("SELECT {} FROM items WHERE learner_id = ?1", ITEM_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![learner_id], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn delete_all_items(&mut self, learner_id: &str) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM items WHERE learner_id = ?1", params![learner_id])?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::exercise_repository;

    #[test]
    fn sqlite_repository_contract() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        exercise_repository(&mut repo);
    }

    #[test]
    fn items_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("srl.db");
        let learner = Learner::new("Robert");
        let card = Card::new("front", "back").with_tag("n5");
        let due = Utc::now();

        {
            let mut repo = SqliteRepository::open(&path).unwrap();
            repo.save_learner(&learner).unwrap();
            repo.save_card(&card).unwrap();
            let mut item = repo
                .create_item(&learner.id, &card.id, ItemState::default())
                .unwrap();
            item.state.due_at = Some(due);
            item.state.last_result = LastResult::Incorrect;
            repo.save_item(&item).unwrap();
        }

        let repo = SqliteRepository::open(&path).unwrap();
        assert_eq!(repo.find_card(&card.id).unwrap(), Some(card.clone()));
        assert_eq!(repo.find_learner(&learner.id).unwrap(), Some(learner.clone()));
        let item = repo.find_item(&learner.id, &card.id).unwrap().unwrap();
        assert_eq!(item.state.due_at, Some(due));
        assert_eq!(item.state.last_result, LastResult::Incorrect);
    }

    #[test]
    fn deleting_learner_cascades_to_items() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let learner = Learner::new("Robert");
        let card = Card::new("front", "back");
        repo.save_learner(&learner).unwrap();
        repo.save_card(&card).unwrap();
        repo.create_item(&learner.id, &card.id, ItemState::default())
            .unwrap();

        assert!(repo.delete_learner(&learner.id).unwrap());
        assert!(repo.list_items(&learner.id).unwrap().is_empty());
        assert!(repo.find_card(&card.id).unwrap().is_some());
    }
}
