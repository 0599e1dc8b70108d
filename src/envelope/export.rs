//! Envelope export to canonical JSON (I3: lossless round-trip).
//!
//! Open maps (`outputs`, `metadata`, tool params, …) are serialized with
//! sorted keys so two equal envelopes always produce byte-identical output.

use serde_json::Value;

/// Export an envelope to canonical JSON bytes.
pub fn to_json(envelope: &super::Envelope) -> crate::types::Result<Vec<u8>> {
    let value = serde_json::to_value(envelope)?;
    let canonical = canonicalize(value);
    Ok(serde_json::to_vec(&canonical)?)
}

/// Canonical JSON string form, used for fingerprinting and golden tests.
pub fn to_canonical_string(value: &Value) -> String {
    let canonical = canonicalize(value.clone());
    serde_json::to_string(&canonical).unwrap_or_default()
}

/// Recursively sort object keys. Arrays keep their original (semantically
/// ordered) order — only `stage_order`, `history`, and similar sequences are
/// order-significant, and none of the envelope's keyed maps are.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
