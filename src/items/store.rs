//! SQLite-backed item store.
//!
//! One table:
//! - `items`: id, owner_id, payload, created_at
//!
//! The payload is an opaque blob this store never interprets. Existence and
//! ownership are the same predicate: an item owned by someone else reads as
//! absent, so nothing leaks across users. Ids are rowids with AUTOINCREMENT
//! and are never reused after a delete.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub owner_id: String,
    pub payload: String,
    pub created_at: i64,
}

/// SQLite-backed item store.
pub struct ItemStore {
    conn: Mutex<rusqlite::Connection>,
}

impl ItemStore {
    /// Open (or create) the item database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_id);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a new item for `owner_id`. Returns the assigned id.
    pub fn create(&self, owner_id: &str, payload: &str) -> Result<i64> {
        if payload.is_empty() {
            return Err(Error::InvalidInput("Data not specified".into()));
        }

        let now = epoch_secs() as i64;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO items (owner_id, payload, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![owner_id, payload, now],
        )?;
        let id = conn.last_insert_rowid();
        tracing::debug!(item_id = id, "item created");
        Ok(id)
    }

    /// One page of the owner's items, ordered by id ascending so repeated
    /// calls with no intervening writes return the same page.
    pub fn list_by_owner(&self, owner_id: &str, offset: u32, limit: u32) -> Result<Vec<Item>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, payload, created_at FROM items
             WHERE owner_id = ?1 ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )?;
        let items = stmt
            .query_map(
                rusqlite::params![owner_id, limit as i64, offset as i64],
                |row| {
                    Ok(Item {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        payload: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Fetch an item the caller owns. An item that exists but belongs to
    /// another user is indistinguishable from one that does not exist.
    pub fn get_owned(&self, owner_id: &str, item_id: i64) -> Result<Item> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, owner_id, payload, created_at FROM items
             WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![item_id, owner_id],
            |row| {
                Ok(Item {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    payload: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        );

        match row {
            Ok(item) => Ok(item),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::not_found("item", item_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Permanently remove an item the caller owns. Same predicate as
    /// [`Self::get_owned`]; no soft delete, no undo.
    pub fn delete_owned(&self, owner_id: &str, item_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM items WHERE id = ?1 AND owner_id = ?2",
            rusqlite::params![item_id, owner_id],
        )?;
        if deleted == 0 {
            return Err(Error::not_found("item", item_id));
        }
        tracing::debug!(item_id, "item deleted");
        Ok(())
    }

    /// Overwrite the owner reference, no previous-owner check. One atomic
    /// UPDATE: concurrent reassignments of the same item resolve
    /// last-write-wins. Only the transfer engine calls this.
    pub fn reassign_owner(&self, item_id: i64, new_owner_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE items SET owner_id = ?1 WHERE id = ?2",
            rusqlite::params![new_owner_id, item_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("item", item_id));
        }
        tracing::info!(item_id, "item ownership reassigned");
        Ok(())
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Tests ───────────────────────────────────────────────────────────
