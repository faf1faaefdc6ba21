//! Guest-to-account reconciliation.
//!
//! Runs once per sign-in: guest lines are re-added to the account one at a
//! time, then the guest state is cleared whatever the per-line outcome. A
//! second run therefore finds nothing to merge.

use serde::Serialize;

use crate::domain::value_objects::LineKey;
use crate::store::{CartStore, WishlistStore};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReconciliationState {
    Idle,
    Merging,
    Completed(ReconciliationReport),
    Failed { reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub lines_attempted: usize,
    pub lines_merged: usize,
    pub entries_merged: usize,
    pub failures: Vec<MergeFailure>,
}

impl ReconciliationReport {
    /// Some guest data did not reach the account and was discarded.
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeFailure {
    pub key: LineKey,
    pub wishlist: bool,
    pub error: String,
}

/// The four stores involved in one sign-in merge.
pub struct MergeTargets<'a> {
    pub guest_cart: &'a dyn CartStore,
    pub guest_wishlist: &'a dyn WishlistStore,
    pub server_cart: &'a dyn CartStore,
    pub server_wishlist: &'a dyn WishlistStore,
}

#[derive(Debug)]
pub struct ReconciliationEngine {
    state: ReconciliationState,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self { state: ReconciliationState::Idle }
    }

    pub fn state(&self) -> &ReconciliationState {
        &self.state
    }

    pub fn into_state(self) -> ReconciliationState {
        self.state
    }

    /// Merge guest state into the account.
    ///
    /// Only acts from `Idle`, and stays `Idle` when the guest has nothing to
    /// merge.
    pub async fn run(&mut self, targets: MergeTargets<'_>) -> &ReconciliationState {
        if self.state != ReconciliationState::Idle {
            return &self.state;
        }

        let guest_cart = match targets.guest_cart.load().await {
            Ok(cart) => cart,
            Err(e) => return self.fail(format!("failed to read guest cart: {e}")),
        };
        let guest_wishlist = match targets.guest_wishlist.load().await {
            Ok(list) => list,
            Err(e) => return self.fail(format!("failed to read guest wishlist: {e}")),
        };
        if guest_cart.is_empty() && guest_wishlist.is_empty() {
            return &self.state;
        }

        self.state = ReconciliationState::Merging;
        let mut report = ReconciliationReport::default();

        // Sequential on purpose: the remote merges per product+variant.
        for line in guest_cart.lines() {
            report.lines_attempted += 1;
            match targets.server_cart.add_line(line.to_new_line()).await {
                Ok(_) => report.lines_merged += 1,
                Err(e) => {
                    tracing::warn!(key = %line.key, error = %e, "guest cart line not merged");
                    report.failures.push(MergeFailure { key: line.key.clone(), wishlist: false, error: e.to_string() });
                }
            }
        }
        for entry in guest_wishlist.entries() {
            match targets.server_wishlist.add(entry.key.clone()).await {
                Ok(_) => report.entries_merged += 1,
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "guest wishlist entry not merged");
                    report.failures.push(MergeFailure { key: entry.key.clone(), wishlist: true, error: e.to_string() });
                }
            }
        }

        if let Err(e) = targets.guest_cart.clear().await {
            return self.fail(format!("failed to clear guest cart: {e}"));
        }
        if let Err(e) = targets.guest_wishlist.clear().await {
            return self.fail(format!("failed to clear guest wishlist: {e}"));
        }

        if report.is_partial_failure() {
            tracing::warn!(
                merged = report.lines_merged + report.entries_merged,
                failed = report.failures.len(),
                "reconciliation partially failed, unmerged guest items dropped"
            );
        } else {
            tracing::info!(
                lines = report.lines_merged,
                entries = report.entries_merged,
                "guest state merged into account"
            );
        }
        self.state = ReconciliationState::Completed(report);
        &self.state
    }

    fn fail(&mut self, reason: String) -> &ReconciliationState {
        tracing::error!(%reason, "reconciliation failed");
        self.state = ReconciliationState::Failed { reason };
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::aggregates::{Cart, NewLine, Wishlist};
    use crate::domain::value_objects::Money;
    use crate::storage::MemoryStorage;
    use crate::store::{GuestCartStore, GuestWishlistStore};
    use crate::{Result, StoreError};

    /// Account-side stores kept in memory, rejecting some products.
    #[derive(Default)]
    struct FakeAccount {
        cart: Mutex<Cart>,
        wishlist: Mutex<Wishlist>,
        rejected: HashSet<String>,
        add_calls: Mutex<usize>,
    }

    impl FakeAccount {
        fn rejecting(products: &[&str]) -> Self {
            Self { rejected: products.iter().map(|p| p.to_string()).collect(), ..Self::default() }
        }
    }

    #[async_trait]
    impl CartStore for FakeAccount {
        async fn load(&self) -> Result<Cart> {
            Ok(self.cart.lock().unwrap().clone())
        }
        async fn add_line(&self, line: NewLine) -> Result<Cart> {
            *self.add_calls.lock().unwrap() += 1;
            if self.rejected.contains(&line.key.product_id) {
                return Err(StoreError::RemoteValidation("unknown product".into()));
            }
            let mut cart = self.cart.lock().unwrap();
            cart.add_line(line)?;
            Ok(cart.clone())
        }
        async fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<Cart> {
            let mut cart = self.cart.lock().unwrap();
            cart.update_quantity(key, quantity);
            Ok(cart.clone())
        }
        async fn remove_line(&self, key: &LineKey) -> Result<Cart> {
            let mut cart = self.cart.lock().unwrap();
            cart.remove_line(key);
            Ok(cart.clone())
        }
        async fn clear(&self) -> Result<Cart> {
            let mut cart = self.cart.lock().unwrap();
            cart.clear();
            Ok(cart.clone())
        }
    }

    #[async_trait]
    impl WishlistStore for FakeAccount {
        async fn load(&self) -> Result<Wishlist> {
            Ok(self.wishlist.lock().unwrap().clone())
        }
        async fn add(&self, key: LineKey) -> Result<Wishlist> {
            let mut list = self.wishlist.lock().unwrap();
            list.add(key);
            Ok(list.clone())
        }
        async fn remove(&self, key: &LineKey) -> Result<Wishlist> {
            let mut list = self.wishlist.lock().unwrap();
            list.remove(key);
            Ok(list.clone())
        }
        async fn clear(&self) -> Result<Wishlist> {
            let mut list = self.wishlist.lock().unwrap();
            list.clear();
            Ok(list.clone())
        }
    }

    fn sku(id: &str) -> LineKey {
        LineKey::product(id).unwrap()
    }

    struct Guest {
        cart: GuestCartStore,
        wishlist: GuestWishlistStore,
    }

    fn guest() -> Guest {
        let storage = Arc::new(MemoryStorage::new());
        Guest { cart: GuestCartStore::new(storage.clone()), wishlist: GuestWishlistStore::new(storage) }
    }

    fn targets<'a>(guest: &'a Guest, account: &'a FakeAccount) -> MergeTargets<'a> {
        MergeTargets {
            guest_cart: &guest.cart,
            guest_wishlist: &guest.wishlist,
            server_cart: account,
            server_wishlist: account,
        }
    }

    #[tokio::test]
    async fn test_overlapping_line_quantities_sum() {
        let guest = guest();
        guest.cart.add_line(NewLine::new(sku("shared"), Money::from_minor(1_000), 2)).await.unwrap();
        guest.cart.add_line(NewLine::new(sku("guest-only"), Money::from_minor(500), 1)).await.unwrap();
        let account = FakeAccount::default();
        CartStore::add_line(&account, NewLine::new(sku("shared"), Money::from_minor(1_000), 3)).await.unwrap();

        let mut engine = ReconciliationEngine::new();
        let state = engine.run(targets(&guest, &account)).await.clone();

        let ReconciliationState::Completed(report) = state else { panic!("expected completion") };
        assert_eq!(report.lines_merged, 2);
        let cart = CartStore::load(&account).await.unwrap();
        assert_eq!(cart.line(&sku("shared")).unwrap().quantity, 5);
        assert_eq!(cart.line(&sku("guest-only")).unwrap().quantity, 1);
        assert!(guest.cart.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let guest = guest();
        guest.cart.add_line(NewLine::new(sku("a"), Money::from_minor(1_000), 2)).await.unwrap();
        let account = FakeAccount::default();

        ReconciliationEngine::new().run(targets(&guest, &account)).await;
        let after_first = CartStore::load(&account).await.unwrap();

        let mut again = ReconciliationEngine::new();
        assert_eq!(again.run(targets(&guest, &account)).await, &ReconciliationState::Idle);
        assert_eq!(CartStore::load(&account).await.unwrap(), after_first);
        assert_eq!(*account.add_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_engine_does_not_rerun() {
        let guest = guest();
        guest.cart.add_line(NewLine::new(sku("a"), Money::from_minor(1_000), 1)).await.unwrap();
        let account = FakeAccount::default();
        let mut engine = ReconciliationEngine::new();
        engine.run(targets(&guest, &account)).await;
        guest.cart.add_line(NewLine::new(sku("b"), Money::from_minor(1_000), 1)).await.unwrap();
        engine.run(targets(&guest, &account)).await;
        assert_eq!(*account.add_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_line_is_skipped_and_guest_still_cleared() {
        let guest = guest();
        guest.cart.add_line(NewLine::new(sku("bad"), Money::from_minor(1_000), 1)).await.unwrap();
        guest.cart.add_line(NewLine::new(sku("good"), Money::from_minor(1_000), 1)).await.unwrap();
        let account = FakeAccount::rejecting(&["bad"]);

        let mut engine = ReconciliationEngine::new();
        engine.run(targets(&guest, &account)).await;

        let ReconciliationState::Completed(report) = engine.state() else { panic!("expected completion") };
        assert!(report.is_partial_failure());
        assert_eq!(report.lines_attempted, 2);
        assert_eq!(report.failures[0].key, sku("bad"));
        assert_eq!(CartStore::load(&account).await.unwrap().line_count(), 1);
        assert!(guest.cart.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wishlist_entries_merged() {
        let guest = guest();
        guest.wishlist.add(sku("w1")).await.unwrap();
        guest.wishlist.add(sku("w2")).await.unwrap();
        let account = FakeAccount::default();
        WishlistStore::add(&account, sku("w1")).await.unwrap();

        let mut engine = ReconciliationEngine::new();
        engine.run(targets(&guest, &account)).await;

        let ReconciliationState::Completed(report) = engine.state() else { panic!("expected completion") };
        assert_eq!(report.entries_merged, 2);
        assert_eq!(WishlistStore::load(&account).await.unwrap().len(), 2);
        assert!(guest.wishlist.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_guest_stays_idle() {
        let guest = guest();
        let account = FakeAccount::default();
        let mut engine = ReconciliationEngine::new();
        assert_eq!(engine.run(targets(&guest, &account)).await, &ReconciliationState::Idle);
    }
}
