//! Converts raw integer balances into human units and USD values.
//!
//! Unit conversion is done on big integers so that 18-decimal balances do not
//! drift. Floating point only appears once the USD value is computed, where it
//! is used for display and aggregation.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, FromPrimitive, Signed, ToPrimitive, Zero};
use std::str::FromStr;
use tracing::warn;

/// Smallest USD value shown as a number; anything below is shown as [`BELOW_MIN_DISPLAY`].
pub const MIN_DISPLAY_VALUE: f64 = 0.01;
pub const BELOW_MIN_DISPLAY: &str = "< 0.01";
/// Largest decimals value accepted from an indexer (ERC20 stores it as a uint8).
pub const MAX_DECIMALS: u32 = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBalance {
    pub formatted_balance: String,
    pub usd_value: f64,
    pub usd_value_formatted: String,
}

impl NormalizedBalance {
    fn zero() -> Self {
        NormalizedBalance {
            formatted_balance: "0".to_string(),
            usd_value: 0.0,
            usd_value_formatted: format_usd(0.0),
        }
    }
}

/// Parses a raw balance. Empty or missing balances are `None`, as are values
/// that are not integers.
pub fn parse_raw_balance(raw: Option<&str>) -> Option<BigInt> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
    match BigInt::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unparseable raw balance '{}': {}", raw, e);
            None
        }
    }
}

/// True when the raw balance parses to a strictly positive integer.
pub fn has_positive_balance(raw: Option<&str>) -> bool {
    parse_raw_balance(raw).is_some_and(|value| value.is_positive())
}

pub fn normalize(raw: Option<&str>, decimals: u32, unit_price: f64) -> NormalizedBalance {
    let Some(raw) = parse_raw_balance(raw).filter(|value| !value.is_zero()) else {
        return NormalizedBalance::zero();
    };

    let formatted_balance = format_units(&raw, decimals);
    let units = BigDecimal::new(raw, i64::from(decimals));
    let usd_value = usd_value(&units, unit_price);

    NormalizedBalance {
        formatted_balance,
        usd_value,
        usd_value_formatted: format_usd(usd_value),
    }
}

fn usd_value(units: &BigDecimal, unit_price: f64) -> f64 {
    if !unit_price.is_finite() || unit_price <= 0.0 {
        return 0.0;
    }
    BigDecimal::from_f64(unit_price)
        .and_then(|price| (units * price).to_f64())
        .unwrap_or(0.0)
}

/// Renders `raw / 10^decimals` as a fixed point string without trailing
/// zeros or a trailing decimal point.
pub fn format_units(raw: &BigInt, decimals: u32) -> String {
    let digits = raw.abs().to_string();
    let scale = decimals as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
    } else {
        digits
    };

    let (integer, fraction) = padded.split_at(padded.len() - scale);
    let fraction = fraction.trim_end_matches('0');
    let sign = if raw.is_negative() { "-" } else { "" };

    if fraction.is_empty() {
        format!("{sign}{integer}")
    } else {
        format!("{sign}{integer}.{fraction}")
    }
}

/// Formats a USD amount with two decimals. Non-zero values below
/// [`MIN_DISPLAY_VALUE`] render as [`BELOW_MIN_DISPLAY`], so callers must
/// check for the `<` prefix before parsing the result.
pub fn format_usd(value: f64) -> String {
    if value > 0.0 && value < MIN_DISPLAY_VALUE {
        BELOW_MIN_DISPLAY.to_string()
    } else {
        format!("{value:.2}")
    }
}
