//! The in-memory value shared by both config formats.
//!
//! `serde_json` is built with `preserve_order`, so object keys keep their
//! declaration order from parse through to serialization.

use serde_json::{Map, Number, Value};

/// Format-agnostic config value
pub type GenericValue = Value;

/// Largest integer a double represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert a double into a JSON value using double-precision number rules.
///
/// Integral values become integers, so `1.0` serializes as `1`. `NaN` and
/// the infinities have no JSON spelling and become `null`.
pub fn number_value(n: f64) -> GenericValue {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        // Also folds -0.0 into 0
        return Value::from(n as i64);
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Format a double the way JS `String(n)` does: shortest round-trip digits,
/// plain notation for exponents in `-7..21`, `e+`/`e-` notation otherwise.
pub fn js_number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    // `{:e}` gives the shortest round-trip digits as `d.ddde<exp>`
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let point = exponent.parse::<i32>().unwrap_or(0) + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let exp = point - 1;
        let exp_sign = if exp < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{exp_sign}{}", exp.abs())
        } else {
            format!("{first}.{rest}e{exp_sign}{}", exp.abs())
        }
    };
    format!("{sign}{body}")
}

/// Whether `key` is a canonical array index (`0` to `2^32 - 2`).
///
/// JS objects list such keys first, in ascending numeric order.
pub fn is_array_index(key: &str) -> bool {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return false;
    }
    key.bytes().all(|b| b.is_ascii_digit())
        && key.parse::<u64>().is_ok_and(|n| n < u64::from(u32::MAX))
}

/// Put array-index keys first in ascending order, other keys keep their order.
pub fn order_keys(map: Map<String, Value>) -> Map<String, Value> {
    if !map.keys().any(|k| is_array_index(k)) {
        return map;
    }
    let (mut indices, named): (Vec<_>, Vec<_>) =
        map.into_iter().partition(|(k, _)| is_array_index(k));
    indices.sort_by_key(|(k, _)| k.parse::<u64>().unwrap_or(0));
    indices.into_iter().chain(named).collect()
}

/// Rewrite every number in `value` with [`number_value`] semantics and
/// order object keys like a JS object would.
pub fn canonicalize(value: GenericValue) -> GenericValue {
    match value {
        Value::Number(n) => {
            if n.is_i64() {
                Value::Number(n)
            } else {
                n.as_f64().map_or(Value::Null, number_value)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(order_keys(
            map.into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect::<Map<_, _>>(),
        )),
        other => other,
    }
}
