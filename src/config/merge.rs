//! Layer merge logic
//!
//! - Objects: deep-merge by key
//! - Arrays: replaced by the overlay
//! - Scalars: overlay wins, except that `null` never clears a value

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
///
/// A `null` in the overlay leaves the base value untouched, so unset CLI
/// flags can be passed through as `null`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None if overlay_value.is_null() => continue,
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
