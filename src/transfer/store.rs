//! Pending transfer-offer store.
//!
//! Offers are single-use rows keyed by an opaque token and bound to the
//! item and the intended recipient; completion must present the token and
//! is checked against both bindings. The table lives in the same database
//! file as the items it references, so both stores may hold their own
//! connection to it.
//!
//! Offers neither expire nor cancel; the only exit from the Offered state
//! is consumption.

use crate::error::Result;
use parking_lot::Mutex;
use rand::RngCore;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Token byte length before hex encoding.
const TOKEN_BYTES: usize = 32;

/// A pending ownership transfer.
#[derive(Debug, Clone)]
pub struct Offer {
    /// The single-use opaque token the recipient must present.
    pub token: String,
    pub item_id: i64,
    pub sender_id: String,
    pub recipient_id: String,
    pub created_at: i64,
}

/// SQLite-backed store of pending offers.
pub struct OfferStore {
    conn: Mutex<rusqlite::Connection>,
}

impl OfferStore {
    /// Open the offer table inside the given database file.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transfer_offers (
                token TEXT PRIMARY KEY,
                item_id INTEGER NOT NULL,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record a new offer. Re-offering the same item to the same recipient
    /// replaces the previous offer, so at most one token is live per
    /// (item, recipient) pair.
    pub fn create(&self, item_id: i64, sender_id: &str, recipient_id: &str) -> Result<Offer> {
        let token = generate_token();
        let now = epoch_secs() as i64;

        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM transfer_offers WHERE item_id = ?1 AND recipient_id = ?2",
            rusqlite::params![item_id, recipient_id],
        )?;
        conn.execute(
            "INSERT INTO transfer_offers (token, item_id, sender_id, recipient_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![token, item_id, sender_id, recipient_id, now],
        )?;

        Ok(Offer {
            token,
            item_id,
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            created_at: now,
        })
    }

    /// Look up a pending offer without consuming it.
    pub fn lookup(&self, token: &str) -> Result<Option<Offer>> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT token, item_id, sender_id, recipient_id, created_at
             FROM transfer_offers WHERE token = ?1",
            rusqlite::params![token],
            |row| {
                Ok(Offer {
                    token: row.get(0)?,
                    item_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    recipient_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        );

        match row {
            Ok(offer) => Ok(Some(offer)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Consume an offer. Returns false when it was already gone, meaning
    /// the caller lost a race with a concurrent completion.
    pub fn consume(&self, token: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM transfer_offers WHERE token = ?1",
            rusqlite::params![token],
        )?;
        Ok(deleted > 0)
    }
}

/// Generate a random offer token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, OfferStore) {
        let tmp = TempDir::new().unwrap();
        let store = OfferStore::open(&tmp.path().join("items.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn create_lookup_consume() {
        let (_tmp, store) = test_store();

        let offer = store.create(1, "sender", "recipient").unwrap();
        assert_eq!(offer.token.len(), TOKEN_BYTES * 2);

        let found = store.lookup(&offer.token).unwrap().unwrap();
        assert_eq!(found.item_id, 1);
        assert_eq!(found.recipient_id, "recipient");

        assert!(store.consume(&offer.token).unwrap());
        assert!(store.lookup(&offer.token).unwrap().is_none());
        assert!(!store.consume(&offer.token).unwrap());
    }

    #[test]
    fn reoffer_replaces_previous_token() {
        let (_tmp, store) = test_store();

        let first = store.create(1, "sender", "recipient").unwrap();
        let second = store.create(1, "sender", "recipient").unwrap();
        assert_ne!(first.token, second.token);

        assert!(store.lookup(&first.token).unwrap().is_none());
        assert!(store.lookup(&second.token).unwrap().is_some());
    }

    #[test]
    fn offers_to_different_recipients_coexist() {
        let (_tmp, store) = test_store();

        let a = store.create(1, "sender", "recipient-a").unwrap();
        let b = store.create(1, "sender", "recipient-b").unwrap();
        assert!(store.lookup(&a.token).unwrap().is_some());
        assert!(store.lookup(&b.token).unwrap().is_some());
    }

    #[test]
    fn unknown_token_is_none() {
        let (_tmp, store) = test_store();

        assert!(store.lookup("no-such-token").unwrap().is_none());
        assert!(!store.consume("no-such-token").unwrap());
    }
}
