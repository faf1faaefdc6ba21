//! Aggregates module
pub mod cart;
pub mod wishlist;

pub use cart::{Cart, CartError, CartLine, NewLine, MAX_LINE_QUANTITY, MAX_UNIT_PRICE};
pub use wishlist::{Wishlist, WishlistEntry};
