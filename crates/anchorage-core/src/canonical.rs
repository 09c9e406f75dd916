//! Canonical payload encoding for hashing and signing.
//!
//! A payload is encoded as compact JSON text with deterministic rules:
//! - Object keys sorted by their UTF-8 bytes, at every nesting level
//! - No insignificant whitespace
//! - Strings escaped with the minimal JSON escape set, `\u00XX` for other controls
//! - Numbers in their shortest round-trip form
//! - Arrays keep their given order
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break every signature devices
//! have already produced and every digest already anchored.

use serde_json::{Map, Value};

use crate::crypto::Sha256Digest;

/// A device payload: string keys to scalar or structured JSON values.
///
/// The order in which entries were inserted never affects the canonical form.
pub type SensorData = Map<String, Value>;

/// Encode a payload to canonical bytes.
pub fn canonical_bytes(data: &SensorData) -> Vec<u8> {
    canonical_string(data).into_bytes()
}

/// Canonical encoding as text.
pub fn canonical_string(data: &SensorData) -> String {
    let mut out = String::new();
    encode_object(&mut out, data);
    out
}

/// SHA-256 of the canonical bytes: the value devices sign and the ledger records.
pub fn payload_digest(data: &SensorData) -> Sha256Digest {
    Sha256Digest::hash(&canonical_bytes(data))
}

fn encode_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => encode_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => encode_object(out, map),
    }
}

/// Encode an object with keys sorted by byte comparison.
fn encode_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_string(out, key);
        out.push(':');
        encode_value(out, value);
    }
    out.push('}');
}

fn encode_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
