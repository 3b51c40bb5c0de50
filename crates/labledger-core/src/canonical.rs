//! Canonical JSON encoding for deterministic hashing.
//!
//! Two payloads that decode to the same JSON value must hash identically,
//! whatever key order or number spelling the producer used. Rules:
//! - Object keys sorted by UTF-8 byte order (Unicode code point order)
//! - No insignificant whitespace
//! - Integers in plain decimal
//! - Integral floats with magnitude up to 2^53 written as integers
//!   (`1.0` and `1` are the same value; `-0.0` is `0`)
//! - Other floats in shortest round-trip form
//! - Strings escaped exactly as `serde_json` escapes them
//!
//! The canonical form is part of the audit hash input, so changing any rule
//! here invalidates every existing chain.

use serde_json::{Number, Value};

use crate::error::CoreError;

/// Largest integer magnitude an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Encode a JSON value in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = String::new();
    write_value(&mut buf, value);
    buf
}

/// Decode arbitrary JSON text and re-encode it canonically.
pub fn canonicalize_str(json: &str) -> Result<String, CoreError> {
    let value: Value = serde_json::from_str(json)?;
    Ok(canonical_json(&value))
}

/// Recursively encode a value.
fn write_value(buf: &mut String, value: &Value) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(true) => buf.push_str("true"),
        Value::Bool(false) => buf.push_str("false"),
        Value::Number(n) => write_number(buf, n),
        Value::String(s) => write_string(buf, s),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_value(buf, item);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            // Sorted explicitly: `preserve_order` may be enabled elsewhere in
            // the dependency graph and would change the map's iteration order.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            buf.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_string(buf, key);
                buf.push(':');
                write_value(buf, item);
            }
            buf.push('}');
        }
    }
}

fn write_number(buf: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        buf.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        buf.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
            // Also maps -0.0 to 0.
            buf.push_str(&(f as i64).to_string());
        } else {
            buf.push_str(&n.to_string());
        }
    } else {
        // arbitrary_precision numbers keep their textual form
        buf.push_str(&n.to_string());
    }
}

fn write_string(buf: &mut String, s: &str) {
    // Serializing a &str cannot fail.
    match serde_json::to_string(s) {
        Ok(quoted) => buf.push_str(&quoted),
        Err(_) => unreachable!("string serialization is infallible"),
    }
}
