//! Canonical serialisation for content addressing.
//!
//! A node's hash must be a pure function of its fields (minus the hash field
//! itself), so the bytes fed to the hash function have to be canonical:
//!
//! - The node's own `hash` field is cleared to the unset sentinel first.
//! - Compact JSON, no whitespace between tokens.
//! - Object keys sorted lexicographically at every nesting level.
//! - Payload bytes hex-encoded (arrays preserve element order).
//!
//! Two replicas that build the same logical node therefore produce the same
//! byte sequence and receive the same label from Storage.

use serde_json::Value;

use crate::hash::Hash;
use crate::node::Node;

/// Produce the canonical byte form of a node for hashing.
///
/// The node's `hash` field is replaced by the unset sentinel before
/// serialisation, so a stamped and an unstamped copy of the same node
/// canonicalise identically.
///
/// # Errors
///
/// Returns `serde_json::Error` if the node fails to serialise.
pub fn canonical_node_form(node: &Node) -> Result<String, serde_json::Error> {
    let mut unstamped = node.clone();
    unstamped.hash = Hash::unset();
    let value = serde_json::to_value(&unstamped)?;
    Ok(canonicalize_json(&value))
}

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// Keys at every object level are sorted lexicographically. Output is
/// compact (no extraneous whitespace).
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => buf.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json's escaping keeps string bytes canonical
            buf.push_str(&serde_json::to_string(s).expect("string serialization cannot fail"));
        }
        Value::Array(arr) => {
            buf.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            buf.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push_str(
                    &serde_json::to_string(key).expect("string serialization cannot fail"),
                );
                buf.push(':');
                if let Some(val) = map.get(*key) {
                    write_canonical(val, buf);
                }
            }
            buf.push('}');
        }
    }
}

/// Serde adapter encoding `Vec<u8>` as a lowercase hex string.
pub mod hex_bytes {
    use std::fmt::Write as _;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as lowercase hex.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x}");
        }
        serializer.serialize_str(&hex)
    }

    /// Deserialize lowercase hex into bytes.
    ///
    /// # Errors
    ///
    /// Fails on odd-length input or non-hex digits.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let hex = String::deserialize(deserializer)?;
        if hex.len() % 2 != 0 {
            return Err(D::Error::custom("hex payload has odd length"));
        }
        hex.as_bytes()
            .chunks(2)
            .map(|pair| {
                let digits =
                    std::str::from_utf8(pair).map_err(|_| D::Error::custom("non-ascii hex"))?;
                u8::from_str_radix(digits, 16)
                    .map_err(|_| D::Error::custom(format!("invalid hex pair '{digits}'")))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
