//! Coercions for gateway JSON, where integers may arrive as numbers or
//! decimal strings depending on their width.

use serde_json::Value;

pub fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn json_u128(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(|v| v as u128),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
