//! Environment configuration.
//!
//! `.env` is loaded through dotenvy, then every setting falls back to a
//! default. A value that is present but malformed is an error rather than a
//! silent default.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::value_objects::Money;
use crate::pricing::{RateConfig, ShippingRate, ShippingRates};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres for the cart API server; `None` keeps carts in memory.
    pub database_url: Option<String>,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Where client-side stores reach the cart API.
    pub cart_api_url: String,
    pub request_timeout: Duration,
    /// SQLite file holding the guest profile.
    pub profile_path: PathBuf,
    pub rates: RateConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RateConfig::default();
        let rates = RateConfig {
            currency: lookup("CART_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.currency),
            tax_rate: rate(&lookup, "CART_TAX_RATE", defaults.tax_rate)?,
            free_shipping_threshold: threshold(&lookup, defaults.free_shipping_threshold)?,
            shipping: ShippingRates {
                air: ShippingRate {
                    flat_minimum: parse_or(&lookup, "CART_AIR_FLAT_MINIMUM", defaults.shipping.air.flat_minimum)?,
                    percentage_rate: rate(&lookup, "CART_AIR_PERCENTAGE_RATE", defaults.shipping.air.percentage_rate)?,
                },
                sea: ShippingRate {
                    flat_minimum: parse_or(&lookup, "CART_SEA_FLAT_MINIMUM", defaults.shipping.sea.flat_minimum)?,
                    percentage_rate: rate(&lookup, "CART_SEA_PERCENTAGE_RATE", defaults.shipping.sea.percentage_rate)?,
                },
            },
        };
        for (key, flat) in [
            ("CART_AIR_FLAT_MINIMUM", rates.shipping.air.flat_minimum),
            ("CART_SEA_FLAT_MINIMUM", rates.shipping.sea.flat_minimum),
        ] {
            if flat.is_negative() {
                return Err(ConfigError::InvalidEnvVar(key.to_string(), "must not be negative".to_string()));
            }
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            port: parse_or(&lookup, "PORT", 8083)?,
            nats_url: lookup("NATS_URL").filter(|v| !v.trim().is_empty()),
            cart_api_url: lookup("CART_API_URL").unwrap_or_else(|| "http://127.0.0.1:8083".to_string()),
            request_timeout: Duration::from_secs(parse_or(&lookup, "CART_REQUEST_TIMEOUT_SECS", 10)?),
            profile_path: lookup("CART_PROFILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/profile.db")),
            rates,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

fn rate<F>(lookup: &F, key: &str, default: Decimal) -> Result<Decimal, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: Decimal = parse_or(lookup, key, default)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConfigError::InvalidEnvVar(key.to_string(), "rate must not be negative".to_string()));
    }
    Ok(value)
}

/// `none` or a negative amount disables free shipping.
fn threshold<F>(lookup: &F, default: Option<Money>) -> Result<Option<Money>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEY: &str = "CART_FREE_SHIPPING_THRESHOLD";
    match lookup(KEY) {
        None => Ok(default),
        Some(raw) if raw.trim().eq_ignore_ascii_case("none") => Ok(None),
        Some(_) => {
            let amount: Money = parse_or(lookup, KEY, Money::ZERO)?;
            Ok((!amount.is_negative()).then_some(amount))
        }
    }
}
