//! SQLite-backed credential store.
//!
//! One table:
//! - `users`: id, username, password_hash, salt, token_hash, created_at
//!
//! Each user holds at most one live session token: logging in again
//! overwrites `token_hash`, which silently deauthorizes whoever held the
//! previous token. Tokens are 32 CSPRNG bytes revealed once in plaintext;
//! only their SHA-256 is stored. Uniqueness is statistical, not enforced
//! by the schema.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for password stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// Longest accepted username.
const MAX_USERNAME_LEN: usize = 64;

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: i64,
}

/// SQLite-backed user store.
pub struct UserStore {
    conn: Mutex<rusqlite::Connection>,
}

impl UserStore {
    /// Open (or create) the user database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                token_hash TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_token ON users(token_hash);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── User management ─────────────────────────────────────────────

    /// Register a new user. Returns the user id.
    pub fn register(&self, username: &str, password: &str) -> Result<String> {
        let trimmed = username.trim();
        if trimmed.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "Username and password must not be empty".into(),
            ));
        }
        if trimmed.len() > MAX_USERNAME_LEN {
            return Err(Error::InvalidInput(format!(
                "Username too long (max {MAX_USERNAME_LEN} characters)"
            )));
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, username, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, trimmed, password_hash, salt, now as i64],
        );

        match result {
            Ok(_) => {
                tracing::info!(username = trimmed, "user registered");
                Ok(user_id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyExists(format!(
                    "Username '{trimmed}' is already taken"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticate by username + password. Idempotent read; never touches
    /// the stored session token.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let trimmed = username.trim();
        let conn = self.conn.lock();
        let row: std::result::Result<(String, String, String, i64), _> = conn.query_row(
            "SELECT id, password_hash, salt, created_at FROM users WHERE username = ?1",
            rusqlite::params![trimmed],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        );

        match row {
            Ok((id, stored_hash, salt, created_at)) => {
                let attempt_hash = hash_password(password, &salt);
                if !constant_time_eq(stored_hash.as_bytes(), attempt_hash.as_bytes()) {
                    return Err(Error::InvalidCredentials);
                }
                Ok(User {
                    id,
                    username: trimmed.to_string(),
                    created_at,
                })
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                // Perform dummy hash to prevent timing side-channel
                let _ = hash_password(password, "0000000000000000");
                Err(Error::not_found("user", trimmed))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Session tokens ──────────────────────────────────────────────

    /// Issue a fresh session token for the user, unconditionally replacing
    /// any previous one. A single UPDATE, so concurrent logins by the same
    /// user resolve last-write-wins. The plaintext token is revealed only
    /// here.
    pub fn issue_token(&self, user_id: &str) -> Result<String> {
        let token = generate_token();
        let token_hash = hash_token(&token);

        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE users SET token_hash = ?1 WHERE id = ?2",
            rusqlite::params![token_hash, user_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("user", user_id));
        }
        tracing::debug!(user_id, "session token issued");
        Ok(token)
    }

    /// Resolve a presented token to its holder. `None` when no user
    /// currently holds this token.
    pub fn resolve_token(&self, token: &str) -> Option<User> {
        let token_hash = hash_token(token);
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, created_at FROM users WHERE token_hash = ?1",
            rusqlite::params![token_hash],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .ok()
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Look up a user by username (transfer recipients).
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, username, created_at FROM users WHERE username = ?1",
            rusqlite::params![username.trim()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        );

        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ── Cryptographic helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a password with salt using iterated SHA-256.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    // Iterated hashing for key stretching
    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Hash a session token (SHA-256, single pass — tokens are already high-entropy).
fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
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

    fn test_store() -> (TempDir, UserStore) {
        let tmp = TempDir::new().unwrap();
        let store = UserStore::open(&tmp.path().join("users.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn register_and_authenticate() {
        let (_tmp, store) = test_store();

        let user_id = store.register("alice", "pw1").unwrap();
        assert!(!user_id.is_empty());

        let user = store.authenticate("alice", "pw1").unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn register_duplicate_username_fails() {
        let (_tmp, store) = test_store();

        store.register("alice", "pw1").unwrap();
        let result = store.register("alice", "other");
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn register_empty_fields_fail() {
        let (_tmp, store) = test_store();

        assert!(matches!(
            store.register("", "pw1"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.register("alice", ""),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.register("   ", "pw1"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn register_overlong_username_fails() {
        let (_tmp, store) = test_store();

        let long = "a".repeat(MAX_USERNAME_LEN + 1);
        assert!(matches!(
            store.register(&long, "pw1"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn authenticate_wrong_password_fails() {
        let (_tmp, store) = test_store();

        store.register("alice", "pw1").unwrap();
        let result = store.authenticate("alice", "wrong");
        assert!(matches!(result, Err(Error::InvalidCredentials)));
    }

    #[test]
    fn authenticate_unknown_user_is_not_found() {
        let (_tmp, store) = test_store();

        let result = store.authenticate("ghost", "pw1");
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn failed_login_never_mutates_token() {
        let (_tmp, store) = test_store();

        let user_id = store.register("alice", "pw1").unwrap();
        let token = store.issue_token(&user_id).unwrap();

        let _ = store.authenticate("alice", "wrong");

        let user = store.resolve_token(&token).expect("token must survive");
        assert_eq!(user.id, user_id);
    }

    #[test]
    fn issue_and_resolve_token() {
        let (_tmp, store) = test_store();

        let user_id = store.register("alice", "pw1").unwrap();
        let token = store.issue_token(&user_id).unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);

        let user = store.resolve_token(&token).unwrap();
        assert_eq!(user.id, user_id);
    }

    #[test]
    fn relogin_invalidates_previous_token() {
        let (_tmp, store) = test_store();

        let user_id = store.register("alice", "pw1").unwrap();
        let first = store.issue_token(&user_id).unwrap();
        let second = store.issue_token(&user_id).unwrap();
        assert_ne!(first, second);

        assert!(store.resolve_token(&first).is_none());
        assert!(store.resolve_token(&second).is_some());
    }

    #[test]
    fn issue_token_for_unknown_user_fails() {
        let (_tmp, store) = test_store();

        let result = store.issue_token("no-such-id");
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn resolve_garbage_token_returns_none() {
        let (_tmp, store) = test_store();

        assert!(store.resolve_token("not-a-token").is_none());
    }

    #[test]
    fn find_by_username() {
        let (_tmp, store) = test_store();

        let user_id = store.register("bob", "pw2").unwrap();
        let found = store.find_by_username("bob").unwrap().unwrap();
        assert_eq!(found.id, user_id);

        assert!(store.find_by_username("ghost").unwrap().is_none());
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let (_tmp, store) = test_store();

        store.register("Alice", "pw1").unwrap();
        assert!(store.find_by_username("alice").unwrap().is_none());
        assert!(matches!(
            store.authenticate("alice", "pw1"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn user_count_tracks_registrations() {
        let (_tmp, store) = test_store();

        assert_eq!(store.user_count().unwrap(), 0);
        store.register("alice", "pw1").unwrap();
        assert_eq!(store.user_count().unwrap(), 1);
        store.register("bob", "pw2").unwrap();
        assert_eq!(store.user_count().unwrap(), 2);
    }

    #[test]
    fn password_hash_is_deterministic_with_same_salt() {
        let h1 = hash_password("test_password", "fixed_salt_value");
        let h2 = hash_password("test_password", "fixed_salt_value");
        assert_eq!(h1, h2);
    }

    #[test]
    fn password_hash_differs_with_different_salt() {
        let h1 = hash_password("test_password", "salt_a");
        let h2 = hash_password("test_password", "salt_b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
