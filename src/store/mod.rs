//! Cart and wishlist stores.
//!
//! Both backings expose the same operation surface so the service can swap
//! them on an auth change without callers noticing.

use async_trait::async_trait;

use crate::domain::aggregates::{Cart, NewLine, Wishlist};
use crate::domain::value_objects::LineKey;
use crate::Result;

pub mod guest;
pub mod remote;
pub mod server;

pub use guest::{GuestCartStore, GuestWishlistStore};
pub use remote::{HttpCartApi, RemoteCartApi};
pub use server::{ServerCartStore, ServerWishlistStore};

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self) -> Result<Cart>;

    /// Post-condition: exactly one line for `line.key`, quantities summed.
    async fn add_line(&self, line: NewLine) -> Result<Cart>;

    /// Absolute quantity; `<= 0` deletes the line.
    async fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<Cart>;

    /// Removing an absent line is not an error.
    async fn remove_line(&self, key: &LineKey) -> Result<Cart>;

    /// Returns the cart as the backing holds it after the clear.
    async fn clear(&self) -> Result<Cart>;
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn load(&self) -> Result<Wishlist>;
    async fn add(&self, key: LineKey) -> Result<Wishlist>;
    async fn remove(&self, key: &LineKey) -> Result<Wishlist>;
    async fn clear(&self) -> Result<Wishlist>;
}
