//! Domain events
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{LineKey, UserId};

/// Whose cart or wishlist changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Guest,
    User(UserId),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    LineAdded { owner: Owner, key: LineKey, quantity: u32 },
    QuantityUpdated { owner: Owner, key: LineKey, quantity: i64 },
    LineRemoved { owner: Owner, key: LineKey },
    Cleared { owner: Owner },
    WishlistChanged { owner: Owner, key: Option<LineKey>, present: bool },
    Reconciled { user: UserId, merged: usize, failed: usize },
}

impl CartEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::WishlistChanged { .. } => "wishlist.changed",
            Self::Reconciled { .. } => "cart.reconciled",
            _ => "cart.changed",
        }
    }
}
