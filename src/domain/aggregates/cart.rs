//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{LineKey, Money};

/// Highest unit or compare-at price a line may carry (9,999,999,999.99).
pub const MAX_UNIT_PRICE: Money = Money::from_minor_const(999_999_999_999);
/// Quantities above this are rejected on add and clamped on merge.
pub const MAX_LINE_QUANTITY: u32 = 100_000;

/// Ordered set of lines owned by one guest or one user.
///
/// Holds at most one line per [`LineKey`] and never a line with quantity 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(default)]
    lines: Vec<CartLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub line_id: String,
    #[serde(flatten)]
    pub key: LineKey,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Money>,
    pub quantity: u32,
}

/// Input for [`Cart::add_line`]; the price is the snapshot taken at add time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLine {
    #[serde(flatten)]
    pub key: LineKey,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Money>,
    pub quantity: u32,
}

impl NewLine {
    pub fn new(key: LineKey, unit_price: Money, quantity: u32) -> Self {
        Self { key, unit_price, compare_at_price: None, quantity }
    }

    pub fn with_compare_at(mut self, compare_at_price: Money) -> Self {
        self.compare_at_price = Some(compare_at_price);
        self
    }

    pub fn validate(&self) -> Result<(), CartError> {
        if self.quantity == 0 || self.quantity > MAX_LINE_QUANTITY { return Err(CartError::InvalidQuantity); }
        if self.unit_price.is_negative() || self.unit_price > MAX_UNIT_PRICE { return Err(CartError::InvalidPrice); }
        if let Some(compare_at) = self.compare_at_price {
            if compare_at < self.unit_price || compare_at > MAX_UNIT_PRICE { return Err(CartError::InvalidPrice); }
        }
        Ok(())
    }
}

impl CartLine {
    pub fn from_new(line: NewLine) -> Self {
        Self {
            line_id: Uuid::now_v7().to_string(),
            key: line.key,
            unit_price: line.unit_price,
            compare_at_price: line.compare_at_price,
            quantity: line.quantity,
        }
    }

    /// `None` only for a line that bypassed [`NewLine::validate`].
    pub fn line_total(&self) -> Option<Money> { self.unit_price.checked_mul(self.quantity) }

    fn within_limits(&self) -> bool { self.to_new_line().validate().is_ok() }

    /// The line as it would be re-added elsewhere, e.g. during reconciliation.
    pub fn to_new_line(&self) -> NewLine {
        NewLine {
            key: self.key.clone(),
            unit_price: self.unit_price,
            compare_at_price: self.compare_at_price,
            quantity: self.quantity,
        }
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuild a cart from stored lines, dropping rows that fail validation
    /// (zero quantity, out-of-range price) and folding duplicate keys together.
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines.into_iter().filter(CartLine::within_limits) {
            match cart.lines.iter_mut().find(|l| l.key == line.key) {
                Some(existing) => existing.quantity = merged_quantity(existing.quantity, line.quantity),
                None => cart.lines.push(line),
            }
        }
        cart
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> { self.lines.iter().find(|l| &l.key == key) }
    pub fn line_count(&self) -> usize { self.lines.len() }
    pub fn total_quantity(&self) -> u64 { self.lines.iter().map(|l| u64::from(l.quantity)).sum() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn updated_at(&self) -> Option<DateTime<Utc>> { self.updated_at }

    /// Adds `line.quantity` to the existing line for the same key, or appends.
    ///
    /// An existing line keeps its original price snapshot.
    pub fn add_line(&mut self, line: NewLine) -> Result<&CartLine, CartError> {
        line.validate()?;
        let idx = match self.lines.iter().position(|l| l.key == line.key) {
            Some(idx) => {
                let existing = &mut self.lines[idx];
                existing.quantity = merged_quantity(existing.quantity, line.quantity);
                idx
            }
            None => {
                self.lines.push(CartLine::from_new(line));
                self.lines.len() - 1
            }
        };
        self.touch();
        Ok(&self.lines[idx])
    }

    /// Sets an absolute quantity; zero or negative removes the line and
    /// anything above [`MAX_LINE_QUANTITY`] is clamped to it.
    ///
    /// Returns false when there was no line for `key`.
    pub fn update_quantity(&mut self, key: &LineKey, quantity: i64) -> bool {
        let Some(idx) = self.lines.iter().position(|l| &l.key == key) else { return false };
        if quantity <= 0 {
            self.lines.remove(idx);
        } else {
            self.lines[idx].quantity = u32::try_from(quantity).unwrap_or(u32::MAX).min(MAX_LINE_QUANTITY);
        }
        self.touch();
        true
    }

    /// Removing an absent line is a no-op; returns whether anything changed.
    pub fn remove_line(&mut self, key: &LineKey) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.key != key);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    pub fn clear(&mut self) { self.lines.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Some(Utc::now()); }
}

fn merged_quantity(a: u32, b: u32) -> u32 { a.saturating_add(b).min(MAX_LINE_QUANTITY) }

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { InvalidQuantity, InvalidPrice }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuantity => write!(f, "quantity must be at least 1"),
            Self::InvalidPrice => write!(f, "price must be non-negative and not above the compare-at price"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku(id: &str) -> LineKey { LineKey::product(id).unwrap() }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        cart.add_line(NewLine::new(sku("P1"), Money::from_minor(1000), 2)).unwrap();
        assert_eq!(cart.line_count(), 1);
        cart.add_line(NewLine::new(sku("P1"), Money::from_minor(1000), 1)).unwrap();
        assert_eq!(cart.lines()[0].quantity, 3); // Merged
        assert_eq!(cart.lines()[0].line_total(), Some(Money::from_minor(3000)));
    }

    #[test]
    fn test_variants_are_distinct_lines() {
        let mut cart = Cart::new();
        cart.add_line(NewLine::new(LineKey::new("P1", Some("red")).unwrap(), Money::from_minor(500), 1)).unwrap();
        cart.add_line(NewLine::new(LineKey::new("P1", Some("blue")).unwrap(), Money::from_minor(500), 1)).unwrap();
        cart.add_line(NewLine::new(sku("P1"), Money::from_minor(500), 1)).unwrap();
        assert_eq!(cart.line_count(), 3);
    }

    #[test]
    fn test_merge_keeps_first_price_snapshot() {
        let mut cart = Cart::new();
        cart.add_line(NewLine::new(sku("P1"), Money::from_minor(1000), 1)).unwrap();
        let line = cart.add_line(NewLine::new(sku("P1"), Money::from_minor(900), 1)).unwrap();
        assert_eq!(line.unit_price, Money::from_minor(1000));
        assert_eq!(line.quantity, 2);
    }

    #[test]
    fn test_update_to_zero_or_negative_deletes() {
        let mut cart = Cart::new();
        cart.add_line(NewLine::new(sku("P1"), Money::from_minor(1000), 4)).unwrap();
        cart.add_line(NewLine::new(sku("P2"), Money::from_minor(1000), 4)).unwrap();
        assert!(cart.update_quantity(&sku("P1"), 0));
        assert!(cart.update_quantity(&sku("P2"), -3));
        assert!(cart.is_empty());
        assert!(!cart.update_quantity(&sku("P3"), 2));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut cart = Cart::new();
        assert!(!cart.remove_line(&sku("nope")));
        assert!(cart.updated_at().is_none());
    }

    #[test]
    fn test_rejects_invalid_lines() {
        let mut cart = Cart::new();
        assert_eq!(cart.add_line(NewLine::new(sku("P1"), Money::from_minor(100), 0)).unwrap_err(), CartError::InvalidQuantity);
        assert_eq!(cart.add_line(NewLine::new(sku("P1"), Money::from_minor(-1), 1)).unwrap_err(), CartError::InvalidPrice);
        let markup = NewLine::new(sku("P1"), Money::from_minor(200), 1).with_compare_at(Money::from_minor(100));
        assert_eq!(cart.add_line(markup).unwrap_err(), CartError::InvalidPrice);
    }

    #[test]
    fn test_rejects_lines_beyond_limits() {
        let mut cart = Cart::new();
        let bulk = NewLine::new(sku("P1"), Money::from_minor(100), MAX_LINE_QUANTITY + 1);
        assert_eq!(cart.add_line(bulk).unwrap_err(), CartError::InvalidQuantity);

        let pricey = NewLine::new(sku("P1"), "10000000000.00".parse().unwrap(), 1);
        assert_eq!(cart.add_line(pricey).unwrap_err(), CartError::InvalidPrice);

        let huge = rust_decimal::Decimal::from_i128_with_scale(10i128.pow(24), 0);
        let overflow = NewLine::new(sku("P1"), Money::new(huge), 1_000_000);
        assert!(cart.add_line(overflow).is_err());

        let compare_at = NewLine::new(sku("P1"), Money::from_minor(100), 1).with_compare_at("10000000000.00".parse().unwrap());
        assert_eq!(cart.add_line(compare_at).unwrap_err(), CartError::InvalidPrice);
        assert!(cart.is_empty());

        let at_limit = NewLine::new(sku("P1"), MAX_UNIT_PRICE, MAX_LINE_QUANTITY);
        assert!(cart.add_line(at_limit).is_ok());
    }

    #[test]
    fn test_quantities_clamp_at_limit() {
        let mut cart = Cart::new();
        cart.add_line(NewLine::new(sku("P1"), Money::from_minor(100), MAX_LINE_QUANTITY)).unwrap();
        let merged = cart.add_line(NewLine::new(sku("P1"), Money::from_minor(100), 5)).unwrap();
        assert_eq!(merged.quantity, MAX_LINE_QUANTITY);

        assert!(cart.update_quantity(&sku("P1"), i64::MAX));
        assert_eq!(cart.lines()[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_from_lines_folds_duplicates_and_zeroes() {
        let a = CartLine::from_new(NewLine::new(sku("P1"), Money::from_minor(100), 1));
        let b = CartLine::from_new(NewLine::new(sku("P1"), Money::from_minor(100), 2));
        let mut zero = CartLine::from_new(NewLine::new(sku("P2"), Money::from_minor(100), 1));
        zero.quantity = 0;
        let mut tampered = CartLine::from_new(NewLine::new(sku("P3"), Money::from_minor(100), 1));
        tampered.unit_price = Money::new(rust_decimal::Decimal::MAX);
        tampered.quantity = 4_000_000_000;
        let cart = Cart::from_lines(vec![a, b, zero, tampered]);
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.total_quantity(), 3);
    }

    #[test]
    fn test_serialized_shape() {
        let mut cart = Cart::new();
        cart.add_line(NewLine::new(LineKey::new("sku-1", Some("xl")).unwrap(), Money::from_minor(10000), 1)).unwrap();
        let json = serde_json::to_value(&cart).unwrap();
        let line = &json["lines"][0];
        assert_eq!(line["productId"], "sku-1");
        assert_eq!(line["variantId"], "xl");
        assert_eq!(line["unitPrice"], "100.00");
        assert_eq!(line["quantity"], 1);
    }
}
