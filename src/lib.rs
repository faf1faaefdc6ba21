//! Storefront cart core
//!
//! Guest and signed-in shopping state for the storefront.
//!
//! ## Features
//! - Guest cart and wishlist persisted in client storage
//! - Server-backed cart and wishlist for signed-in shoppers
//! - One-time merge of guest state into the account on sign-in
//! - Decimal pricing: line totals, tax, shipping, discounts
//! - Remote cart API server (axum + Postgres)

use serde::Serialize;
use thiserror::Error;

pub mod api;
pub mod config;
pub mod domain;
pub mod identity;
pub mod pricing;
pub mod reconcile;
pub mod service;
pub mod storage;
pub mod store;

pub use domain::aggregates::{Cart, CartLine, NewLine, Wishlist, WishlistEntry};
pub use domain::events::{CartEvent, Owner};
pub use domain::value_objects::{AnonymousId, LineKey, Money, UserId};
pub use pricing::{PricingSnapshot, RateConfig, ShippingMethod};
pub use service::{CartService, CartView, LineDiscount};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote rejected request: {0}")]
    RemoteValidation(String),

    #[error("Invalid line: {0}")]
    InvalidLine(#[from] domain::aggregates::CartError),

    #[error("Not signed in")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Transient; the shopper may simply try again.
    Retryable,
    /// The request itself was refused; retrying unchanged will not help.
    Rejected,
    SignInRequired,
}

/// The only failure shape UI layers see.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct UserNotice {
    pub kind: NoticeKind,
    pub message: String,
}

impl StoreError {
    pub fn notice(&self) -> UserNotice {
        let (kind, message) = match self {
            Self::Network(_) => (NoticeKind::Retryable, "We couldn't reach the store. Please try again.".to_string()),
            Self::Storage(_) => (NoticeKind::Retryable, "Your cart couldn't be saved on this device. Please try again.".to_string()),
            Self::RemoteValidation(msg) => (NoticeKind::Rejected, msg.clone()),
            Self::InvalidLine(e) => (NoticeKind::Rejected, e.to_string()),
            Self::NotAuthenticated => (NoticeKind::SignInRequired, "Please sign in again.".to_string()),
        };
        UserNotice { kind, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_hides_internal_detail() {
        let notice = StoreError::Network("connect error: tcp 10.0.0.3:8083 refused".into()).notice();
        assert_eq!(notice.kind, NoticeKind::Retryable);
        assert!(!notice.message.contains("10.0.0.3"));
    }

    #[test]
    fn test_remote_validation_is_distinct() {
        let notice = StoreError::RemoteValidation("quantity must be at least 1".into()).notice();
        assert_eq!(notice.kind, NoticeKind::Rejected);
        assert_eq!(notice.to_string(), "quantity must be at least 1");
    }

    #[test]
    fn test_local_line_errors_are_rejections() {
        let notice = StoreError::from(domain::aggregates::CartError::InvalidPrice).notice();
        assert_eq!(notice.kind, NoticeKind::Rejected);
        assert_eq!(StoreError::NotAuthenticated.notice().kind, NoticeKind::SignInRequired);
    }
}
