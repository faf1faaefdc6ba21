//! Stores for signed-in shoppers.
//!
//! The remote is the source of truth: every mutation is followed by a fresh
//! `load`, and nothing is cached locally between calls.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CartStore, RemoteCartApi, WishlistStore};
use crate::domain::aggregates::{Cart, NewLine, Wishlist};
use crate::domain::value_objects::{LineKey, UserId};
use crate::Result;

#[derive(Clone)]
pub struct ServerCartStore {
    api: Arc<dyn RemoteCartApi>,
    user: UserId,
}

impl ServerCartStore {
    pub fn new(api: Arc<dyn RemoteCartApi>, user: UserId) -> Self {
        Self { api, user }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }
}

#[async_trait]
impl CartStore for ServerCartStore {
    async fn load(&self) -> Result<Cart> {
        self.api.get_cart(&self.user).await
    }

    async fn add_line(&self, line: NewLine) -> Result<Cart> {
        line.validate()?;
        self.api.add_line(&self.user, &line).await?;
        self.load().await
    }

    async fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<Cart> {
        self.api.set_quantity(&self.user, key, quantity).await?;
        self.load().await
    }

    async fn remove_line(&self, key: &LineKey) -> Result<Cart> {
        self.api.delete_line(&self.user, key).await?;
        self.load().await
    }

    async fn clear(&self) -> Result<Cart> {
        self.api.delete_cart(&self.user).await?;
        self.load().await
    }
}

#[derive(Clone)]
pub struct ServerWishlistStore {
    api: Arc<dyn RemoteCartApi>,
    user: UserId,
}

impl ServerWishlistStore {
    pub fn new(api: Arc<dyn RemoteCartApi>, user: UserId) -> Self {
        Self { api, user }
    }
}

#[async_trait]
impl WishlistStore for ServerWishlistStore {
    async fn load(&self) -> Result<Wishlist> {
        self.api.get_wishlist(&self.user).await
    }

    async fn add(&self, key: LineKey) -> Result<Wishlist> {
        self.api.add_wishlist_entry(&self.user, &key).await?;
        self.load().await
    }

    async fn remove(&self, key: &LineKey) -> Result<Wishlist> {
        self.api.delete_wishlist_entry(&self.user, key).await?;
        self.load().await
    }

    async fn clear(&self) -> Result<Wishlist> {
        self.api.delete_wishlist(&self.user).await?;
        self.load().await
    }
}
