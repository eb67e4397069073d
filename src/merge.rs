//! Recursive deep-merge for JSON values.
//!
//! Status and config mutations go through this single merge contract:
//! object keys merge recursively, every non-object value (including
//! `null`) overwrites the target slot.

use serde_json::{Map, Value};

/// Merge `patch` into `target` in place.
///
/// A `null` in the patch clears the target slot; patching an object into
/// a non-object slot replaces the slot with the patch object.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_object() {
                let slot = target_map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                deep_merge(slot, value);
            } else {
                target_map.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merge `patch` over `base` and return the result.
#[must_use]
pub fn merged(base: &Value, patch: &Value) -> Value {
    let mut out = base.clone();
    deep_merge(&mut out, patch);
    out
}
