//! Normalization of dashboard numbers
//!
//! Solar.web renders many values for display: `"1.012,4"`, `"12,4 kWh"`.
//! These helpers turn them into `f64`. Anything unparseable becomes `0.0`.

use serde::{Deserialize, Deserializer};

/// Convert a German-formatted number with optional unit suffix to `f64`.
///
/// Dots are thousands separators, the first comma is the decimal point, and
/// everything after the first whitespace is ignored.
pub fn parse_localized_float(value: &str) -> f64 {
    let token = value.split_whitespace().next().unwrap_or("");
    let normalized = token.replace('.', "").replacen(',', ".", 1);
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Serde adapter for fields that arrive as JSON numbers, display strings or null
pub fn deserialize_localized<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(0.0),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0)),
        Some(serde_json::Value::String(s)) => Ok(parse_localized_float(&s)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected number or numeric string, got {}",
            other
        ))),
    }
}
