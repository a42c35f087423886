//! Offer comparison
//!
//! Policies are compared in canonical form: array order is irrelevant,
//! single-element arrays equal their element, and the top-level `@id` (the
//! offer identity) is ignored.

use serde_json::Value;

/// Canonical form of a compact policy.
pub fn canonicalize(policy: &Value) -> Value {
    match policy {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(k, _)| k.as_str() != "@id")
                .map(|(k, v)| (k.clone(), canonical_value(v)))
                .collect(),
        ),
        other => canonical_value(other),
    }
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonical_value).collect();
            if items.len() == 1 {
                return items.swap_remove(0);
            }
            items.sort_by_cached_key(|v| v.to_string());
            Value::Array(items)
        }
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), canonical_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Structural equality of two policies in canonical form.
pub fn policies_match(expected: &Value, received: &Value) -> bool {
    canonicalize(expected) == canonicalize(received)
}
