//! Server-side cart and wishlist persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartLine, NewLine, Wishlist, WishlistEntry, MAX_LINE_QUANTITY};
use crate::domain::value_objects::{LineKey, Money, UserId};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Per-user carts and wishlists. Every mutation returns the resulting state.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn cart(&self, user: &UserId) -> Result<Cart, RepositoryError>;
    /// Merges into an existing line for the same key by summing quantities.
    async fn upsert_line(&self, user: &UserId, line: NewLine) -> Result<Cart, RepositoryError>;
    /// Absolute set; zero or negative deletes.
    async fn set_quantity(&self, user: &UserId, key: &LineKey, quantity: i64) -> Result<Cart, RepositoryError>;
    async fn delete_line(&self, user: &UserId, key: &LineKey) -> Result<Cart, RepositoryError>;
    async fn clear_cart(&self, user: &UserId) -> Result<Cart, RepositoryError>;

    async fn wishlist(&self, user: &UserId) -> Result<Wishlist, RepositoryError>;
    async fn add_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist, RepositoryError>;
    async fn delete_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist, RepositoryError>;
    async fn clear_wishlist(&self, user: &UserId) -> Result<Wishlist, RepositoryError>;
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default, Clone)]
struct Account {
    cart: Cart,
    wishlist: Wishlist,
}

/// Used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryCartRepository {
    accounts: RwLock<HashMap<UserId, Account>>,
}

impl MemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_account<T>(&self, user: &UserId, f: impl FnOnce(&mut Account) -> T) -> T {
        let mut accounts = self.accounts.write().await;
        f(accounts.entry(user.clone()).or_default())
    }
}

#[async_trait]
impl CartRepository for MemoryCartRepository {
    async fn cart(&self, user: &UserId) -> Result<Cart, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(user).map(|a| a.cart.clone()).unwrap_or_default())
    }

    async fn upsert_line(&self, user: &UserId, line: NewLine) -> Result<Cart, RepositoryError> {
        self.with_account(user, |account| -> Result<Cart, RepositoryError> {
            account
                .cart
                .add_line(line)
                .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
            Ok(account.cart.clone())
        })
        .await
    }

    async fn set_quantity(&self, user: &UserId, key: &LineKey, quantity: i64) -> Result<Cart, RepositoryError> {
        Ok(self
            .with_account(user, |account| {
                account.cart.update_quantity(key, quantity);
                account.cart.clone()
            })
            .await)
    }

    async fn delete_line(&self, user: &UserId, key: &LineKey) -> Result<Cart, RepositoryError> {
        Ok(self
            .with_account(user, |account| {
                account.cart.remove_line(key);
                account.cart.clone()
            })
            .await)
    }

    async fn clear_cart(&self, user: &UserId) -> Result<Cart, RepositoryError> {
        Ok(self
            .with_account(user, |account| {
                account.cart.clear();
                account.cart.clone()
            })
            .await)
    }

    async fn wishlist(&self, user: &UserId) -> Result<Wishlist, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(user).map(|a| a.wishlist.clone()).unwrap_or_default())
    }

    async fn add_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist, RepositoryError> {
        Ok(self
            .with_account(user, |account| {
                account.wishlist.add(key.clone());
                account.wishlist.clone()
            })
            .await)
    }

    async fn delete_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist, RepositoryError> {
        Ok(self
            .with_account(user, |account| {
                account.wishlist.remove(key);
                account.wishlist.clone()
            })
            .await)
    }

    async fn clear_wishlist(&self, user: &UserId) -> Result<Wishlist, RepositoryError> {
        Ok(self
            .with_account(user, |account| {
                account.wishlist.clear();
                account.wishlist.clone()
            })
            .await)
    }
}

// =============================================================================
// Postgres
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    line_id: Uuid,
    product_id: String,
    variant_id: String,
    unit_price: Decimal,
    compare_at_price: Option<Decimal>,
    quantity: i32,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let key = LineKey::new(row.product_id, Some(row.variant_id))
            .map_err(|e| RepositoryError::Corrupt(format!("cart line {}: {e}", row.line_id)))?;
        Ok(CartLine {
            line_id: row.line_id.to_string(),
            key,
            unit_price: Money::new(row.unit_price),
            compare_at_price: row.compare_at_price.map(Money::new),
            quantity: u32::try_from(row.quantity).unwrap_or(0),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WishlistRow {
    product_id: String,
    variant_id: String,
    added_at: DateTime<Utc>,
}

/// The default variant is stored as `''` so it takes part in the unique key.
fn variant_column(key: &LineKey) -> &str {
    key.variant_id().unwrap_or("")
}

/// Clamped the same way `Cart::update_quantity` clamps.
fn db_quantity(quantity: i64) -> i32 {
    let clamped = quantity.min(i64::from(MAX_LINE_QUANTITY));
    i32::try_from(clamped).unwrap_or(0)
}

#[derive(Clone)]
pub struct PgCartRepository {
    db: PgPool,
}

impl PgCartRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn cart(&self, user: &UserId) -> Result<Cart, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT line_id, product_id, variant_id, unit_price, compare_at_price, quantity \
             FROM cart_lines WHERE user_id = $1 ORDER BY created_at, line_id",
        )
        .bind(user.as_str())
        .fetch_all(&self.db)
        .await?;
        let lines = rows.into_iter().map(CartLine::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(Cart::from_lines(lines))
    }

    async fn upsert_line(&self, user: &UserId, line: NewLine) -> Result<Cart, RepositoryError> {
        sqlx::query(
            "INSERT INTO cart_lines (line_id, user_id, product_id, variant_id, unit_price, compare_at_price, quantity, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) \
             ON CONFLICT (user_id, product_id, variant_id) DO UPDATE \
             SET quantity = LEAST(cart_lines.quantity + EXCLUDED.quantity, 100000), updated_at = NOW()",
        )
        .bind(Uuid::now_v7())
        .bind(user.as_str())
        .bind(line.key.product_id())
        .bind(variant_column(&line.key))
        .bind(line.unit_price.amount())
        .bind(line.compare_at_price.map(|m| m.amount()))
        .bind(db_quantity(i64::from(line.quantity)))
        .execute(&self.db)
        .await?;
        self.cart(user).await
    }

    async fn set_quantity(&self, user: &UserId, key: &LineKey, quantity: i64) -> Result<Cart, RepositoryError> {
        if quantity <= 0 {
            return self.delete_line(user, key).await;
        }
        sqlx::query(
            "UPDATE cart_lines SET quantity = $4, updated_at = NOW() \
             WHERE user_id = $1 AND product_id = $2 AND variant_id = $3",
        )
        .bind(user.as_str())
        .bind(key.product_id())
        .bind(variant_column(key))
        .bind(db_quantity(quantity))
        .execute(&self.db)
        .await?;
        self.cart(user).await
    }

    async fn delete_line(&self, user: &UserId, key: &LineKey) -> Result<Cart, RepositoryError> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1 AND product_id = $2 AND variant_id = $3")
            .bind(user.as_str())
            .bind(key.product_id())
            .bind(variant_column(key))
            .execute(&self.db)
            .await?;
        self.cart(user).await
    }

    async fn clear_cart(&self, user: &UserId) -> Result<Cart, RepositoryError> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(user.as_str())
            .execute(&self.db)
            .await?;
        Ok(Cart::new())
    }

    async fn wishlist(&self, user: &UserId) -> Result<Wishlist, RepositoryError> {
        let rows = sqlx::query_as::<_, WishlistRow>(
            "SELECT product_id, variant_id, added_at FROM wishlist_entries \
             WHERE user_id = $1 ORDER BY added_at, product_id, variant_id",
        )
        .bind(user.as_str())
        .fetch_all(&self.db)
        .await?;
        let entries = rows
            .into_iter()
            .map(|row| {
                LineKey::new(row.product_id, Some(row.variant_id))
                    .map(|key| WishlistEntry { key, added_at: row.added_at })
                    .map_err(|e| RepositoryError::Corrupt(format!("wishlist entry: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Wishlist::from_entries(entries))
    }

    async fn add_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist, RepositoryError> {
        // DO NOTHING keeps the first added_at.
        sqlx::query(
            "INSERT INTO wishlist_entries (user_id, product_id, variant_id, added_at) \
             VALUES ($1, $2, $3, NOW()) ON CONFLICT (user_id, product_id, variant_id) DO NOTHING",
        )
        .bind(user.as_str())
        .bind(key.product_id())
        .bind(variant_column(key))
        .execute(&self.db)
        .await?;
        self.wishlist(user).await
    }

    async fn delete_wishlist_entry(&self, user: &UserId, key: &LineKey) -> Result<Wishlist, RepositoryError> {
        sqlx::query("DELETE FROM wishlist_entries WHERE user_id = $1 AND product_id = $2 AND variant_id = $3")
            .bind(user.as_str())
            .bind(key.product_id())
            .bind(variant_column(key))
            .execute(&self.db)
            .await?;
        self.wishlist(user).await
    }

    async fn clear_wishlist(&self, user: &UserId) -> Result<Wishlist, RepositoryError> {
        sqlx::query("DELETE FROM wishlist_entries WHERE user_id = $1")
            .bind(user.as_str())
            .execute(&self.db)
            .await?;
        Ok(Wishlist::new())
    }
}
