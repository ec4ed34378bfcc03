//! Canonical JSON serialization and SHA-256 helpers
//!
//! Every hash in the pipeline (content keys, the cumulative hash, checkpoint
//! links and signatures) is computed over canonical JSON: object keys sorted
//! lexicographically at every depth, no insignificant whitespace. The result
//! depends only on the value, never on struct field order or map insertion
//! order.

use crate::error::{CoreError, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Length of a lowercase hex SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Serialize any value into canonical JSON bytes
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
    canonical_json_bytes(&value)
}

/// Render a JSON value in canonical form
pub fn canonical_json_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = String::new();
    write_canonical_json(value, &mut out)?;
    Ok(out.into_bytes())
}

fn write_canonical_json(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            let s = serde_json::to_string(value)
                .map_err(|e| CoreError::Serialization(e.to_string()))?;
            out.push_str(&s);
            Ok(())
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out)?;
            }
            out.push(']');
            Ok(())
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                let key_json = serde_json::to_string(key)
                    .map_err(|e| CoreError::Serialization(e.to_string()))?;
                out.push_str(&key_json);
                out.push(':');
                if let Some(val) = map.get(*key) {
                    write_canonical_json(val, out)?;
                }
            }
            out.push('}');
            Ok(())
        }
    }
}

/// Lowercase hex SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of a value's canonical JSON
pub fn canonical_sha256<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(sha256_hex(&canonical_bytes(value)?))
}

/// Check that a string is a well-formed lowercase hex SHA-256 digest
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == SHA256_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
