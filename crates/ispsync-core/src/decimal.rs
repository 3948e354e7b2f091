//! Decimal helpers
//!
//! Money and data volumes arrive from providers and billing databases as
//! JSON numbers, strings or driver-specific numerics. Everything goes
//! through the textual form so no value ever passes through `f64`.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Parse a decimal from its textual representation.
///
/// Accepts plain and scientific notation ("1e3" shows up when a provider
/// serializes large floats).
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Convert a JSON value to a decimal.
///
/// Numbers are converted through their shortest round-trip string, strings
/// are parsed, anything else yields `None`.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}
