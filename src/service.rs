//! Cart and wishlist facade used by UI layers.
//!
//! Picks the guest or account store from the auth state on every call,
//! serialises mutations in arrival order, prices every returned cart, and
//! turns store failures into a [`UserNotice`].

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::config::Config;
use crate::domain::aggregates::{Cart, NewLine, Wishlist};
use crate::domain::events::{CartEvent, Owner};
use crate::domain::value_objects::{LineKey, UserId};
use crate::identity::{AuthState, AuthTransition, GuestIdentity};
use crate::pricing::{line_discount, snapshot_or_zero, PricingSnapshot, RateSource, SharedRates, ShippingMethod};
use crate::reconcile::{MergeTargets, ReconciliationEngine, ReconciliationState};
use crate::storage::{KeyValueStorage, SqliteStorage};
use crate::store::{
    CartStore, GuestCartStore, GuestWishlistStore, HttpCartApi, RemoteCartApi, ServerCartStore,
    ServerWishlistStore, WishlistStore,
};
use crate::{StoreError, UserNotice};

const EVENT_CAPACITY: usize = 64;

/// A cart together with the totals derived from it at read time.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart: Cart,
    pub pricing: PricingSnapshot,
    /// Markdown badges, only for lines sold below their compare-at price.
    pub discounts: Vec<LineDiscount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDiscount {
    #[serde(flatten)]
    pub key: LineKey,
    pub percent: u8,
}

pub enum ActiveCartStore {
    Guest(GuestCartStore),
    Server(ServerCartStore),
}

impl ActiveCartStore {
    pub fn owner(&self) -> Owner {
        match self {
            Self::Guest(_) => Owner::Guest,
            Self::Server(store) => Owner::User(store.user().clone()),
        }
    }

    fn store(&self) -> &dyn CartStore {
        match self {
            Self::Guest(store) => store,
            Self::Server(store) => store,
        }
    }
}

pub struct CartService {
    auth: AuthState,
    identity: GuestIdentity,
    guest_cart: GuestCartStore,
    guest_wishlist: GuestWishlistStore,
    remote: Arc<dyn RemoteCartApi>,
    rates: Arc<dyn RateSource>,
    shipping_method: RwLock<ShippingMethod>,
    // tokio's Mutex is fair, so queued mutations run in arrival order.
    ops: Mutex<()>,
    events: broadcast::Sender<CartEvent>,
}

impl CartService {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        remote: Arc<dyn RemoteCartApi>,
        rates: Arc<dyn RateSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            auth: AuthState::new(),
            identity: GuestIdentity::new(storage.clone()),
            guest_cart: GuestCartStore::new(storage.clone()),
            guest_wishlist: GuestWishlistStore::new(storage),
            remote,
            rates,
            shipping_method: RwLock::new(ShippingMethod::default()),
            ops: Mutex::new(()),
            events,
        }
    }

    /// Service over the SQLite profile and HTTP cart API named by `config`.
    pub async fn connect(config: &Config) -> crate::Result<Self> {
        let storage = SqliteStorage::open(&config.profile_path).await?;
        let remote = HttpCartApi::new(config.cart_api_url.clone(), config.request_timeout)?;
        Ok(Self::new(
            Arc::new(storage),
            Arc::new(remote),
            Arc::new(SharedRates::new(config.rates.clone())),
        ))
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    pub fn shipping_method(&self) -> ShippingMethod {
        *self.shipping_method.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_shipping_method(&self, method: ShippingMethod) {
        *self.shipping_method.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = method;
    }

    /// Re-evaluated on every call; never cached across auth changes.
    pub fn active_store(&self) -> ActiveCartStore {
        match self.auth.current() {
            None => ActiveCartStore::Guest(self.guest_cart.clone()),
            Some(user) => ActiveCartStore::Server(ServerCartStore::new(self.remote.clone(), user)),
        }
    }

    fn active_wishlist(&self) -> (Owner, Box<dyn WishlistStore>) {
        match self.auth.current() {
            None => (Owner::Guest, Box::new(self.guest_wishlist.clone())),
            Some(user) => (
                Owner::User(user.clone()),
                Box::new(ServerWishlistStore::new(self.remote.clone(), user)),
            ),
        }
    }

    /// Totals for `cart` under the rates in force right now.
    pub fn price(&self, cart: &Cart) -> PricingSnapshot {
        snapshot_or_zero(cart.lines(), &self.rates.current(), self.shipping_method())
    }

    fn view(&self, cart: Cart) -> CartView {
        let pricing = self.price(&cart);
        let discounts = cart
            .lines()
            .iter()
            .filter_map(|line| {
                let percent = line_discount(line);
                (percent > 0).then(|| LineDiscount { key: line.key.clone(), percent })
            })
            .collect();
        CartView { cart, pricing, discounts }
    }

    fn emit(&self, event: CartEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub async fn load(&self) -> Result<CartView, UserNotice> {
        let cart = self.active_store().store().load().await.map_err(surface)?;
        Ok(self.view(cart))
    }

    pub async fn add_line(&self, line: NewLine) -> Result<CartView, UserNotice> {
        let _guard = self.ops.lock().await;
        let active = self.active_store();
        let (key, quantity) = (line.key.clone(), line.quantity);
        let cart = active.store().add_line(line).await.map_err(surface)?;
        self.emit(CartEvent::LineAdded { owner: active.owner(), key, quantity });
        Ok(self.view(cart))
    }

    pub async fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<CartView, UserNotice> {
        let _guard = self.ops.lock().await;
        let active = self.active_store();
        let cart = active.store().update_quantity(key, quantity).await.map_err(surface)?;
        self.emit(CartEvent::QuantityUpdated { owner: active.owner(), key: key.clone(), quantity });
        Ok(self.view(cart))
    }

    pub async fn remove_line(&self, key: &LineKey) -> Result<CartView, UserNotice> {
        let _guard = self.ops.lock().await;
        let active = self.active_store();
        let cart = active.store().remove_line(key).await.map_err(surface)?;
        self.emit(CartEvent::LineRemoved { owner: active.owner(), key: key.clone() });
        Ok(self.view(cart))
    }

    pub async fn clear(&self) -> Result<CartView, UserNotice> {
        let _guard = self.ops.lock().await;
        let active = self.active_store();
        let cart = active.store().clear().await.map_err(surface)?;
        self.emit(CartEvent::Cleared { owner: active.owner() });
        Ok(self.view(cart))
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    pub async fn load_wishlist(&self) -> Result<Wishlist, UserNotice> {
        let (_, store) = self.active_wishlist();
        store.load().await.map_err(surface)
    }

    pub async fn add_to_wishlist(&self, key: LineKey) -> Result<Wishlist, UserNotice> {
        let _guard = self.ops.lock().await;
        let (owner, store) = self.active_wishlist();
        let list = store.add(key.clone()).await.map_err(surface)?;
        self.emit(CartEvent::WishlistChanged { owner, key: Some(key), present: true });
        Ok(list)
    }

    pub async fn remove_from_wishlist(&self, key: &LineKey) -> Result<Wishlist, UserNotice> {
        let _guard = self.ops.lock().await;
        let (owner, store) = self.active_wishlist();
        let list = store.remove(key).await.map_err(surface)?;
        self.emit(CartEvent::WishlistChanged { owner, key: Some(key.clone()), present: false });
        Ok(list)
    }

    /// Adds when absent, removes when present.
    pub async fn toggle_wishlist(&self, key: LineKey) -> Result<Wishlist, UserNotice> {
        let _guard = self.ops.lock().await;
        let (owner, store) = self.active_wishlist();
        let present = store.load().await.map_err(surface)?.contains(&key);
        let list = if present {
            store.remove(&key).await
        } else {
            store.add(key.clone()).await
        }
        .map_err(surface)?;
        self.emit(CartEvent::WishlistChanged { owner, key: Some(key), present: !present });
        Ok(list)
    }

    pub async fn clear_wishlist(&self) -> Result<Wishlist, UserNotice> {
        let _guard = self.ops.lock().await;
        let (owner, store) = self.active_wishlist();
        let list = store.clear().await.map_err(surface)?;
        self.emit(CartEvent::WishlistChanged { owner, key: None, present: false });
        Ok(list)
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn sign_in(&self, user: UserId) -> ReconciliationState {
        self.observe_identity(Some(user)).await
    }

    pub async fn sign_out(&self) -> ReconciliationState {
        self.observe_identity(None).await
    }

    /// Feed the identity the auth layer currently reports.
    ///
    /// Only a guest-to-user transition merges anything; repeated reports of
    /// the same identity are no-ops.
    pub async fn observe_identity(&self, identity: Option<UserId>) -> ReconciliationState {
        let _guard = self.ops.lock().await;
        match self.auth.set(identity) {
            AuthTransition::SignedIn(user) => self.reconcile(user).await,
            AuthTransition::SignedOut(user) => {
                tracing::info!(user = %user, "signed out, back to guest cart");
                ReconciliationState::Idle
            }
            AuthTransition::Switched { .. } | AuthTransition::Unchanged => ReconciliationState::Idle,
        }
    }

    async fn reconcile(&self, user: UserId) -> ReconciliationState {
        // The visitor is now a known user whatever the merge outcome.
        if let Err(e) = self.identity.discard().await {
            tracing::warn!(error = %e, "failed to discard anonymous identity");
        }
        let server_cart = ServerCartStore::new(self.remote.clone(), user.clone());
        let server_wishlist = ServerWishlistStore::new(self.remote.clone(), user.clone());
        let mut engine = ReconciliationEngine::new();
        engine
            .run(MergeTargets {
                guest_cart: &self.guest_cart,
                guest_wishlist: &self.guest_wishlist,
                server_cart: &server_cart,
                server_wishlist: &server_wishlist,
            })
            .await;

        let state = engine.into_state();
        if let ReconciliationState::Completed(report) = &state {
            self.emit(CartEvent::Reconciled {
                user,
                merged: report.lines_merged + report.entries_merged,
                failed: report.failures.len(),
            });
        }
        state
    }
}

fn surface(err: StoreError) -> UserNotice {
    tracing::warn!(error = %err, "cart operation failed");
    err.notice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;
    use crate::pricing::RateConfig;
    use crate::storage::{MemoryStorage, GUEST_CART_KEY, GUEST_IDENTITY_KEY};
    use crate::NoticeKind;
    use rust_decimal::Decimal;

    /// Remote that is never reachable.
    struct Offline;

    #[async_trait::async_trait]
    impl RemoteCartApi for Offline {
        async fn get_cart(&self, _: &UserId) -> crate::Result<Cart> { Err(StoreError::Network("offline".into())) }
        async fn add_line(&self, _: &UserId, _: &NewLine) -> crate::Result<Cart> { Err(StoreError::Network("offline".into())) }
        async fn set_quantity(&self, _: &UserId, _: &LineKey, _: i64) -> crate::Result<Cart> { Err(StoreError::Network("offline".into())) }
        async fn delete_line(&self, _: &UserId, _: &LineKey) -> crate::Result<Cart> { Err(StoreError::Network("offline".into())) }
        async fn delete_cart(&self, _: &UserId) -> crate::Result<Cart> { Err(StoreError::Network("offline".into())) }
        async fn get_wishlist(&self, _: &UserId) -> crate::Result<Wishlist> { Err(StoreError::Network("offline".into())) }
        async fn add_wishlist_entry(&self, _: &UserId, _: &LineKey) -> crate::Result<Wishlist> { Err(StoreError::Network("offline".into())) }
        async fn delete_wishlist_entry(&self, _: &UserId, _: &LineKey) -> crate::Result<Wishlist> { Err(StoreError::Network("offline".into())) }
        async fn delete_wishlist(&self, _: &UserId) -> crate::Result<Wishlist> { Err(StoreError::Network("offline".into())) }
    }

    fn service() -> CartService {
        service_over(Arc::new(MemoryStorage::new()))
    }

    fn service_over(storage: Arc<MemoryStorage>) -> CartService {
        CartService::new(storage, Arc::new(Offline), Arc::new(RateConfig::default()))
    }

    fn sku(id: &str) -> LineKey {
        LineKey::product(id).unwrap()
    }

    #[tokio::test]
    async fn test_guest_mutations_return_priced_cart() {
        let svc = service();
        let view = svc.add_line(NewLine::new(sku("a"), Money::from_minor(4_000), 1)).await.unwrap();
        assert_eq!(view.pricing.subtotal, Money::from_minor(4_000));
        assert_eq!(view.pricing.shipping_cost, Money::from_minor(5_000));
        assert_eq!(view.pricing.total, Money::from_minor(9_600));
    }

    #[tokio::test]
    async fn test_shipping_method_is_applied() {
        let svc = service();
        svc.set_shipping_method(ShippingMethod::Sea);
        let view = svc.add_line(NewLine::new(sku("a"), Money::from_minor(4_000), 1)).await.unwrap();
        assert_eq!(view.pricing.shipping_cost, Money::from_minor(2_000));
    }

    #[tokio::test]
    async fn test_active_store_follows_auth() {
        let svc = service();
        assert!(matches!(svc.active_store(), ActiveCartStore::Guest(_)));
        svc.auth().set(Some(UserId::new("u1")));
        assert!(matches!(svc.active_store(), ActiveCartStore::Server(_)));
        svc.auth().set(None);
        assert!(matches!(svc.active_store(), ActiveCartStore::Guest(_)));
    }

    #[tokio::test]
    async fn test_network_failure_surfaces_retryable_notice() {
        let svc = service();
        svc.auth().set(Some(UserId::new("u1")));
        let notice = svc.add_line(NewLine::new(sku("a"), Money::from_minor(100), 1)).await.unwrap_err();
        assert_eq!(notice.kind, NoticeKind::Retryable);
    }

    #[tokio::test]
    async fn test_invalid_line_rejected_locally() {
        let svc = service();
        let notice = svc.add_line(NewLine::new(sku("a"), Money::from_minor(100), 0)).await.unwrap_err();
        assert_eq!(notice.kind, NoticeKind::Rejected);
    }

    #[tokio::test]
    async fn test_out_of_range_line_rejected_without_storing() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service_over(storage.clone());
        let price = Money::new(Decimal::from_i128_with_scale(10i128.pow(24), 0));
        let notice = svc.add_line(NewLine::new(sku("a"), price, 1_000_000)).await.unwrap_err();
        assert_eq!(notice.kind, NoticeKind::Rejected);
        assert_eq!(storage.read(GUEST_CART_KEY).await.unwrap(), None);
        assert!(svc.load().await.unwrap().cart.is_empty());
    }

    #[tokio::test]
    async fn test_tampered_guest_cart_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .write(
                GUEST_CART_KEY,
                r#"{"lines":[{"lineId":"1","productId":"p","unitPrice":"79228162514264337593543950.00","quantity":4000000000}]}"#,
            )
            .await
            .unwrap();
        let svc = service_over(storage);
        let view = svc.load().await.unwrap();
        assert!(view.cart.is_empty());
        assert_eq!(view.pricing, PricingSnapshot::default());
    }

    #[tokio::test]
    async fn test_view_lists_line_discounts() {
        let svc = service();
        let sale = NewLine::new(sku("a"), Money::from_minor(7_500), 1).with_compare_at(Money::from_minor(10_000));
        svc.add_line(sale).await.unwrap();
        let view = svc.add_line(NewLine::new(sku("b"), Money::from_minor(1_000), 1)).await.unwrap();
        assert_eq!(view.discounts, vec![LineDiscount { key: sku("a"), percent: 25 }]);
    }

    #[tokio::test]
    async fn test_clear_returns_store_result() {
        let svc = service();
        svc.add_line(NewLine::new(sku("a"), Money::from_minor(100), 1)).await.unwrap();
        svc.add_to_wishlist(sku("w")).await.unwrap();
        let view = svc.clear().await.unwrap();
        assert!(view.cart.is_empty());
        assert!(svc.clear_wishlist().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_discards_identity_even_when_idle() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service_over(storage.clone());
        svc.add_line(NewLine::new(sku("a"), Money::from_minor(100), 1)).await.unwrap();
        svc.remove_line(&sku("a")).await.unwrap();
        assert!(storage.read(GUEST_IDENTITY_KEY).await.unwrap().is_some());

        let state = svc.sign_in(UserId::new("u1")).await;
        assert!(matches!(state, ReconciliationState::Idle));
        assert_eq!(storage.read(GUEST_IDENTITY_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_events_emitted_after_mutation() {
        let svc = service();
        let mut rx = svc.subscribe();
        svc.add_line(NewLine::new(sku("a"), Money::from_minor(100), 2)).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            CartEvent::LineAdded { owner: Owner::Guest, key: sku("a"), quantity: 2 }
        );
    }

    #[tokio::test]
    async fn test_failed_merge_does_not_block_sign_in() {
        let svc = service();
        svc.add_line(NewLine::new(sku("a"), Money::from_minor(100), 1)).await.unwrap();
        let state = svc.sign_in(UserId::new("u1")).await;
        let ReconciliationState::Completed(report) = state else { panic!("expected completion") };
        assert!(report.is_partial_failure());
        assert_eq!(svc.auth().current(), Some(UserId::new("u1")));
        svc.sign_out().await;
        assert!(svc.load().await.unwrap().cart.is_empty());
    }

    #[tokio::test]
    async fn test_guest_wishlist_toggle() {
        let svc = service();
        assert!(svc.toggle_wishlist(sku("w")).await.unwrap().contains(&sku("w")));
        assert!(svc.toggle_wishlist(sku("w")).await.unwrap().is_empty());
    }
}
