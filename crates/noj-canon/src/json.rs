//! Canonical and display JSON encodings.
//!
//! `canonicalize` is the hashing form: sorted keys, compact separators
//! (JCS). `pretty` is the on-disk display form used for `meta.json` and
//! `manifest.json`. Both normalize `\r\n` to `\n` inside string values first.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonError;

/// Recursively rewrite `\r\n` to `\n` in every string value.
///
/// Object keys are left untouched.
pub fn normalize_newlines(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains("\r\n") {
                *s = s.replace("\r\n", "\n");
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_newlines),
        Value::Object(map) => map.values_mut().for_each(normalize_newlines),
        _ => {}
    }
}

fn normalized_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonError> {
    let mut value = serde_json::to_value(value)?;
    normalize_newlines(&mut value);
    Ok(value)
}

/// Serialize to canonical bytes (sorted keys, no incidental whitespace).
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonError> {
    let value = normalized_value(value)?;
    serde_json_canonicalizer::to_vec(&value).map_err(|e| CanonError::JcsError(e.to_string()))
}

/// Serialize to indented, sorted-key JSON terminated by exactly one newline.
pub fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonError> {
    // serde_json::Map is ordered by key, so going through Value sorts keys
    let value = normalized_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    while bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    bytes.push(b'\n');
    Ok(bytes)
}
