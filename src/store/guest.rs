//! Guest stores backed by client key/value storage.
//!
//! Every mutation writes the whole serialized value back before returning.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{CartStore, WishlistStore};
use crate::domain::aggregates::{Cart, NewLine, Wishlist};
use crate::domain::value_objects::LineKey;
use crate::identity::GuestIdentity;
use crate::storage::{KeyValueStorage, StorageError, GUEST_CART_KEY, GUEST_WISHLIST_KEY};
use crate::Result;

/// Reads `key`, treating missing or unparseable data as the default value.
async fn read_or_default<T: DeserializeOwned + Default>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> std::result::Result<T, StorageError> {
    let Some(raw) = storage.read(key).await? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "guest storage is corrupt, starting empty");
            Ok(T::default())
        }
    }
}

async fn write_through<T: Serialize>(
    storage: &dyn KeyValueStorage,
    key: &str,
    value: &T,
) -> std::result::Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    storage.write(key, &raw).await
}

#[derive(Clone)]
pub struct GuestCartStore {
    storage: Arc<dyn KeyValueStorage>,
    identity: GuestIdentity,
}

impl GuestCartStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let identity = GuestIdentity::new(storage.clone());
        Self { storage, identity }
    }

    async fn persist(&self, cart: &Cart) -> Result<()> {
        write_through(self.storage.as_ref(), GUEST_CART_KEY, cart).await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for GuestCartStore {
    async fn load(&self) -> Result<Cart> {
        let stored: Cart = read_or_default(self.storage.as_ref(), GUEST_CART_KEY).await?;
        // Storage is client-writable; re-apply the line invariants on read.
        Ok(Cart::from_lines(stored.lines().iter().cloned()))
    }

    async fn add_line(&self, line: NewLine) -> Result<Cart> {
        self.identity.ensure().await?;
        let mut cart = self.load().await?;
        cart.add_line(line)?;
        self.persist(&cart).await?;
        Ok(cart)
    }

    async fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<Cart> {
        let mut cart = self.load().await?;
        if cart.update_quantity(key, quantity) {
            self.persist(&cart).await?;
        }
        Ok(cart)
    }

    async fn remove_line(&self, key: &LineKey) -> Result<Cart> {
        let mut cart = self.load().await?;
        if cart.remove_line(key) {
            self.persist(&cart).await?;
        }
        Ok(cart)
    }

    async fn clear(&self) -> Result<Cart> {
        let cart = Cart::new();
        self.persist(&cart).await?;
        Ok(cart)
    }
}

#[derive(Clone)]
pub struct GuestWishlistStore {
    storage: Arc<dyn KeyValueStorage>,
    identity: GuestIdentity,
}

impl GuestWishlistStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let identity = GuestIdentity::new(storage.clone());
        Self { storage, identity }
    }

    async fn persist(&self, list: &Wishlist) -> Result<()> {
        write_through(self.storage.as_ref(), GUEST_WISHLIST_KEY, list).await?;
        Ok(())
    }
}

#[async_trait]
impl WishlistStore for GuestWishlistStore {
    async fn load(&self) -> Result<Wishlist> {
        let stored: Wishlist = read_or_default(self.storage.as_ref(), GUEST_WISHLIST_KEY).await?;
        Ok(Wishlist::from_entries(stored.entries().iter().cloned()))
    }

    async fn add(&self, key: LineKey) -> Result<Wishlist> {
        self.identity.ensure().await?;
        let mut list = self.load().await?;
        if list.add(key) {
            self.persist(&list).await?;
        }
        Ok(list)
    }

    async fn remove(&self, key: &LineKey) -> Result<Wishlist> {
        let mut list = self.load().await?;
        if list.remove(key) {
            self.persist(&list).await?;
        }
        Ok(list)
    }

    async fn clear(&self) -> Result<Wishlist> {
        let list = Wishlist::new();
        self.persist(&list).await?;
        Ok(list)
    }
}
