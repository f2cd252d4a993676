//! Authentication: credential storage plus the single authorization gate.
//!
//! Provides:
//! - User registration with username/password (iterated SHA-256, 100k rounds + per-user salt)
//! - One opaque session token per user, overwritten on each login
//! - SQLite-backed persistent storage
//!
//! ## Design Decisions
//! - No external JWT dependency — sessions use opaque random tokens with
//!   server-side SHA-256 hashed lookup.
//! - Every protected operation passes through [`Authenticator::require_auth`];
//!   there is no second path that resolves a token to a user.
//! - No logout and no expiry: the only invalidation path is the overwrite
//!   that happens when the same user logs in again.

pub mod store;

pub use store::{User, UserStore};

use crate::error::{Error, Result};
use std::sync::Arc;

/// Stateless wrapper over [`UserStore`] exposing the two operations the
/// gateway composes everything else from.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<UserStore>,
}

impl Authenticator {
    pub fn new(users: Arc<UserStore>) -> Self {
        Self { users }
    }

    /// The backing store, for operations outside the auth flow (recipient
    /// lookups, registration caps).
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Verify credentials, then issue a fresh session token (replacing any
    /// previous one for this user).
    pub fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "Username and password must not be empty".into(),
            ));
        }
        let user = self.users.authenticate(username, password)?;
        let token = self.users.issue_token(&user.id)?;
        Ok((user, token))
    }

    /// Resolve a presented bearer token to its user. The only gate used by
    /// protected operations.
    pub fn require_auth(&self, token: Option<&str>) -> Result<User> {
        let token = token.ok_or(Error::Unauthenticated)?;
        self.users.resolve_token(token).ok_or(Error::Unauthenticated)
    }
}
