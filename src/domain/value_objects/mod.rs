//! Value Objects for the cart domain

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Minor-unit precision of every currency this storefront sells in.
pub const MONEY_SCALE: u32 = 2;

/// Monetary amount held at minor-unit precision.
///
/// Every constructor rounds half away from zero to exactly [`MONEY_SCALE`]
/// places, so sums of `Money` never drift below a minor unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, MONEY_SCALE));

    pub fn new(amount: Decimal) -> Self {
        let mut amount = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(MONEY_SCALE);
        Self(amount)
    }

    /// `Money::from_minor(1999)` is 19.99.
    pub fn from_minor(minor: i64) -> Self { Self::new(Decimal::new(minor, MONEY_SCALE)) }

    /// Const counterpart of [`Money::from_minor`] for non-negative amounts.
    pub const fn from_minor_const(minor: u64) -> Self {
        Self(Decimal::from_parts(minor as u32, (minor >> 32) as u32, 0, false, MONEY_SCALE))
    }

    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    // Arithmetic is checked: `None` on overflow of the decimal range.
    pub fn checked_add(&self, other: Money) -> Option<Money> { self.0.checked_add(other.0).map(Money::new) }
    pub fn checked_mul(&self, qty: u32) -> Option<Money> { self.0.checked_mul(Decimal::from(qty)).map(Money::new) }
    pub fn checked_scale(&self, factor: Decimal) -> Option<Money> { self.0.checked_mul(factor).map(Money::new) }
}

impl Default for Money { fn default() -> Self { Self::ZERO } }

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Money::new(amount) }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self { money.0 }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { s.trim().parse::<Decimal>().map(Money::new) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Identity of a cart line or wishlist entry: product plus optional variant.
///
/// `None` is the product's default variant. An empty variant string is
/// normalised to `None` so `("p", Some(""))` and `("p", None)` collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
}

impl LineKey {
    pub fn new(product_id: impl Into<String>, variant_id: Option<impl Into<String>>) -> Result<Self, LineKeyError> {
        let product_id = product_id.into().trim().to_string();
        if product_id.is_empty() { return Err(LineKeyError::EmptyProduct); }
        let variant_id = variant_id
            .map(|v| v.into().trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self { product_id, variant_id })
    }

    /// Shorthand for the default variant of a product.
    pub fn product(product_id: impl Into<String>) -> Result<Self, LineKeyError> {
        Self::new(product_id, None::<String>)
    }

    pub fn product_id(&self) -> &str { &self.product_id }
    pub fn variant_id(&self) -> Option<&str> { self.variant_id.as_deref() }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(v) => write!(f, "{}/{}", self.product_id, v),
            None => write!(f, "{}", self.product_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum LineKeyError { EmptyProduct }
impl std::error::Error for LineKeyError {}
impl fmt::Display for LineKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "product id is empty") }
}

/// Authenticated shopper, as reported by the auth layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Token generated for an unauthenticated visitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousId(Uuid);

impl AnonymousId {
    pub fn generate() -> Self { Self(Uuid::now_v7()) }
    pub fn parse(value: &str) -> Option<Self> { Uuid::parse_str(value.trim()).ok().map(Self) }
    pub fn as_uuid(&self) -> &Uuid { &self.0 }
}

impl fmt::Display for AnonymousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
