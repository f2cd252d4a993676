//! Two-step ownership hand-off.
//!
//! `offer` produces a recipient-bound single-use token for an item the
//! sender owns; `complete` consumes the token and reassigns the item to
//! the recipient. States: Idle -> Offered -> Completed. There is no
//! cancellation, no expiry, and no audit trail; the previous owner loses
//! access the moment the reassignment commits.

pub mod store;

pub use store::{Offer, OfferStore};

use crate::auth::UserStore;
use crate::error::{Error, Result};
use crate::items::ItemStore;
use std::sync::Arc;

/// Mediates moving an item from one user to another.
#[derive(Clone)]
pub struct TransferEngine {
    users: Arc<UserStore>,
    items: Arc<ItemStore>,
    offers: Arc<OfferStore>,
}

impl TransferEngine {
    pub fn new(users: Arc<UserStore>, items: Arc<ItemStore>, offers: Arc<OfferStore>) -> Self {
        Self {
            users,
            items,
            offers,
        }
    }

    /// Initiate a transfer. The sender must own the item (the same
    /// predicate as a plain fetch, so a missing item and someone else's
    /// item produce the same signal), and the recipient must exist.
    pub fn offer(
        &self,
        sender_id: &str,
        item_id: i64,
        recipient_username: &str,
    ) -> Result<Offer> {
        self.items.get_owned(sender_id, item_id)?;
        let recipient = self
            .users
            .find_by_username(recipient_username)?
            .ok_or_else(|| Error::not_found("user", recipient_username))?;

        let offer = self.offers.create(item_id, sender_id, &recipient.id)?;
        tracing::info!(item_id, recipient = recipient_username, "transfer offered");
        Ok(offer)
    }

    /// Complete a transfer as the authenticated recipient. The presented
    /// token must name a pending offer whose item and recipient both match;
    /// any mismatch is the same `NotFound` signal. The offer is consumed
    /// before the reassignment, so a raced duplicate completion fails
    /// rather than reassigning twice.
    pub fn complete(&self, recipient_id: &str, token: &str, item_id: i64) -> Result<()> {
        let offer = self
            .offers
            .lookup(token)?
            .ok_or_else(|| Error::not_found("transfer", item_id))?;

        if offer.item_id != item_id || offer.recipient_id != recipient_id {
            return Err(Error::not_found("transfer", item_id));
        }

        if !self.offers.consume(token)? {
            return Err(Error::not_found("transfer", item_id));
        }

        self.items.reassign_owner(item_id, recipient_id)?;
        tracing::info!(item_id, "transfer completed");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        users: Arc<UserStore>,
        items: Arc<ItemStore>,
        engine: TransferEngine,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let users = Arc::new(UserStore::open(&tmp.path().join("users.db")).unwrap());
        let items = Arc::new(ItemStore::open(&tmp.path().join("items.db")).unwrap());
        let offers = Arc::new(OfferStore::open(&tmp.path().join("items.db")).unwrap());
        let engine = TransferEngine::new(users.clone(), items.clone(), offers);
        Fixture {
            _tmp: tmp,
            users,
            items,
            engine,
        }
    }

    #[test]
    fn offer_and_complete_moves_ownership() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let bob = f.users.register("bob", "pw2").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        let offer = f.engine.offer(&alice, item_id, "bob").unwrap();
        f.engine.complete(&bob, &offer.token, item_id).unwrap();

        let item = f.items.get_owned(&bob, item_id).unwrap();
        assert_eq!(item.payload, "hello");
        assert!(matches!(
            f.items.get_owned(&alice, item_id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn offer_by_non_owner_is_not_found() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let bob = f.users.register("bob", "pw2").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        assert!(matches!(
            f.engine.offer(&bob, item_id, "alice"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn offer_missing_item_is_not_found() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        f.users.register("bob", "pw2").unwrap();

        assert!(matches!(
            f.engine.offer(&alice, 999, "bob"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn offer_to_unknown_recipient_is_not_found() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        assert!(matches!(
            f.engine.offer(&alice, item_id, "ghost"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn complete_with_wrong_item_is_not_found() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let bob = f.users.register("bob", "pw2").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();
        let other_id = f.items.create(&alice, "other").unwrap();

        let offer = f.engine.offer(&alice, item_id, "bob").unwrap();
        assert!(matches!(
            f.engine.complete(&bob, &offer.token, other_id),
            Err(Error::NotFound { .. })
        ));
        // The offer survives a mismatched attempt
        f.engine.complete(&bob, &offer.token, item_id).unwrap();
    }

    #[test]
    fn complete_by_wrong_recipient_is_not_found() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        f.users.register("bob", "pw2").unwrap();
        let carol = f.users.register("carol", "pw3").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        let offer = f.engine.offer(&alice, item_id, "bob").unwrap();
        assert!(matches!(
            f.engine.complete(&carol, &offer.token, item_id),
            Err(Error::NotFound { .. })
        ));
        // Alice still owns it
        assert!(f.items.get_owned(&alice, item_id).is_ok());
    }

    #[test]
    fn completed_offer_cannot_be_replayed() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let bob = f.users.register("bob", "pw2").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        let offer = f.engine.offer(&alice, item_id, "bob").unwrap();
        f.engine.complete(&bob, &offer.token, item_id).unwrap();
        assert!(matches!(
            f.engine.complete(&bob, &offer.token, item_id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn reoffer_invalidates_previous_token() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let bob = f.users.register("bob", "pw2").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        let first = f.engine.offer(&alice, item_id, "bob").unwrap();
        let second = f.engine.offer(&alice, item_id, "bob").unwrap();

        assert!(matches!(
            f.engine.complete(&bob, &first.token, item_id),
            Err(Error::NotFound { .. })
        ));
        f.engine.complete(&bob, &second.token, item_id).unwrap();
    }

    #[test]
    fn completing_a_deleted_item_is_not_found() {
        let f = fixture();
        let alice = f.users.register("alice", "pw1").unwrap();
        let bob = f.users.register("bob", "pw2").unwrap();
        let item_id = f.items.create(&alice, "hello").unwrap();

        let offer = f.engine.offer(&alice, item_id, "bob").unwrap();
        f.items.delete_owned(&alice, item_id).unwrap();

        assert!(matches!(
            f.engine.complete(&bob, &offer.token, item_id),
            Err(Error::NotFound { .. })
        ));
    }
}
