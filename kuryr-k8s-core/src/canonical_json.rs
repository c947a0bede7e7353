//! Canonical (key-sorted) JSON encoding for annotation values.
//!
//! Kubernetes annotations are plain strings; the persisted spec and state
//! are encoded as canonical JSON (keys sorted) so that two controllers (or
//! one controller across restarts) that compute the same logical value
//! produce byte-identical annotation text. That's what makes reconciliation
//! idempotence observable from the outside: an unchanged computed value
//! never triggers a write.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Serializes `value` to a JSON string with object keys sorted at every
/// nesting level.
pub fn to_canonical_string<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(value))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
