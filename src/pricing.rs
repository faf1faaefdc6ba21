//! Pricing engine.
//!
//! Pure functions deriving display totals from cart lines and the current
//! rate configuration. Nothing here is cached: callers pass the rates they
//! read at call time, so an admin rate change applies to the next read.

use std::sync::{Arc, RwLock};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::CartLine;
use crate::domain::value_objects::Money;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Invalid rate: {0}")]
    InvalidRate(Decimal),

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Amount out of range")]
    Overflow,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    #[default]
    Air,
    Sea,
}

impl std::str::FromStr for ShippingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "air" => Ok(Self::Air),
            "sea" => Ok(Self::Sea),
            other => Err(format!("unknown shipping method '{other}'")),
        }
    }
}

/// Shipping floor for one method: `max(flat_minimum, subtotal * percentage_rate)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRate {
    pub flat_minimum: Money,
    pub percentage_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingRates {
    pub air: ShippingRate,
    pub sea: ShippingRate,
}

impl ShippingRates {
    pub fn rate(&self, method: ShippingMethod) -> &ShippingRate {
        match method {
            ShippingMethod::Air => &self.air,
            ShippingMethod::Sea => &self.sea,
        }
    }
}

/// The single source of tax and shipping parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateConfig {
    pub currency: String,
    pub tax_rate: Decimal,
    /// `None` (or a negative amount) disables free shipping.
    pub free_shipping_threshold: Option<Money>,
    pub shipping: ShippingRates,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            currency: "GHS".to_string(),
            tax_rate: Decimal::new(15, 2),
            free_shipping_threshold: Some(Money::from_minor(50_000)),
            shipping: ShippingRates {
                air: ShippingRate { flat_minimum: Money::from_minor(5_000), percentage_rate: Decimal::new(10, 2) },
                sea: ShippingRate { flat_minimum: Money::from_minor(2_000), percentage_rate: Decimal::new(5, 2) },
            },
        }
    }
}

/// Supplies the rates in force right now.
pub trait RateSource: Send + Sync {
    fn current(&self) -> RateConfig;
}

impl RateSource for RateConfig {
    fn current(&self) -> RateConfig { self.clone() }
}

/// Rates that an admin path can replace at runtime.
#[derive(Clone, Debug, Default)]
pub struct SharedRates {
    inner: Arc<RwLock<RateConfig>>,
}

impl SharedRates {
    pub fn new(config: RateConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(config)) }
    }

    pub fn replace(&self, config: RateConfig) {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = config;
    }
}

impl RateSource for SharedRates {
    fn current(&self) -> RateConfig {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

/// Derived totals for a cart. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSnapshot {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub total: Money,
    pub total_item_count: u64,
}

pub fn compute_line_total(line: &CartLine) -> Result<Money, PricingError> {
    if line.quantity == 0 {
        return Err(PricingError::InvalidQuantity(0));
    }
    line.line_total().ok_or(PricingError::Overflow)
}

pub fn compute_subtotal(lines: &[CartLine]) -> Result<Money, PricingError> {
    lines.iter().try_fold(Money::ZERO, |acc, line| {
        acc.checked_add(compute_line_total(line)?).ok_or(PricingError::Overflow)
    })
}

pub fn compute_tax(subtotal: Money, tax_rate: Decimal) -> Result<Money, PricingError> {
    if tax_rate.is_sign_negative() && !tax_rate.is_zero() {
        return Err(PricingError::InvalidRate(tax_rate));
    }
    subtotal.checked_scale(tax_rate).ok_or(PricingError::Overflow)
}

pub fn compute_shipping(
    subtotal: Money,
    method: ShippingMethod,
    rates: &ShippingRates,
    free_threshold: Option<Money>,
) -> Result<Money, PricingError> {
    let rate = rates.rate(method);
    if rate.percentage_rate.is_sign_negative() && !rate.percentage_rate.is_zero() {
        return Err(PricingError::InvalidRate(rate.percentage_rate));
    }
    if rate.flat_minimum.is_negative() {
        return Err(PricingError::InvalidPrice(rate.flat_minimum.amount()));
    }
    if let Some(threshold) = free_threshold.filter(|t| !t.is_negative()) {
        if subtotal >= threshold {
            return Ok(Money::ZERO);
        }
    }
    let proportional = subtotal.checked_scale(rate.percentage_rate).ok_or(PricingError::Overflow)?;
    Ok(rate.flat_minimum.max(proportional))
}

/// Whole-percent markdown from `original_price` to `sale_price`, in `0..=100`.
///
/// A sale price above the original is a markup and reports 0.
pub fn compute_discount_percentage(original_price: Money, sale_price: Money) -> Result<u8, PricingError> {
    let original = original_price.amount();
    if original <= Decimal::ZERO {
        return Err(PricingError::InvalidPrice(original));
    }
    let percent = original
        .checked_sub(sale_price.amount())
        .and_then(|markdown| markdown.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|scaled| scaled.checked_div(original))
        .ok_or(PricingError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    Ok(percent.to_u8().unwrap_or(0))
}

/// Recomputes every total from `lines` and `rates`.
///
/// An empty cart ships for free; otherwise `total == subtotal + shipping + tax`.
pub fn compute_pricing_snapshot(
    lines: &[CartLine],
    rates: &RateConfig,
    method: ShippingMethod,
) -> Result<PricingSnapshot, PricingError> {
    let subtotal = compute_subtotal(lines)?;
    let tax_amount = compute_tax(subtotal, rates.tax_rate)?;
    let shipping_cost = if lines.is_empty() {
        Money::ZERO
    } else {
        compute_shipping(subtotal, method, &rates.shipping, rates.free_shipping_threshold)?
    };
    Ok(PricingSnapshot {
        subtotal,
        shipping_cost,
        tax_amount,
        total: subtotal
            .checked_add(shipping_cost)
            .and_then(|t| t.checked_add(tax_amount))
            .ok_or(PricingError::Overflow)?,
        total_item_count: lines.iter().map(|l| u64::from(l.quantity)).sum(),
    })
}

/// Rendering path: zeroed totals on overflow, and on bad rates in release builds.
pub fn snapshot_or_zero(lines: &[CartLine], rates: &RateConfig, method: ShippingMethod) -> PricingSnapshot {
    match compute_pricing_snapshot(lines, rates, method) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug_assert!(e == PricingError::Overflow, "pricing precondition violated: {e}");
            tracing::warn!(error = %e, "pricing failed, showing zero totals");
            PricingSnapshot::default()
        }
    }
}

/// Badge helper for product cards; a bad original price shows no badge.
pub fn discount_or_zero(original_price: Money, sale_price: Money) -> u8 {
    compute_discount_percentage(original_price, sale_price).unwrap_or_else(|e| {
        debug_assert!(e == PricingError::Overflow, "discount precondition violated: {e}");
        tracing::warn!(error = %e, "discount failed, showing none");
        0
    })
}

/// Markdown badge for a cart line: the percentage off its compare-at price,
/// or 0 when the line carries none.
pub fn line_discount(line: &CartLine) -> u8 {
    match line.compare_at_price {
        Some(original) if original > Money::ZERO => discount_or_zero(original, line.unit_price),
        _ => 0,
    }
}
