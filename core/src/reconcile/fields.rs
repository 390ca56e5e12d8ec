//! Field comparison between what the inventory holds and what a scan observed.
//!
//! The inventory answers with richer shapes than it accepts: choice fields come
//! back as `{"value": .., "label": ..}`, references as nested objects, decimals
//! sometimes as strings. Comparisons normalise both sides first so an unchanged
//! object never produces a write.

use serde_json::Value;

use crate::inventory::{Fields, Record, value_id};

pub fn same_value(current: Option<&Value>, desired: &Value) -> bool {
    let Some(current) = current.filter(|value| !value.is_null()) else {
        return desired.is_null();
    };

    match (current, desired) {
        (Value::Object(map), Value::String(_)) => map.get("value") == Some(desired),
        (Value::Object(_), Value::Number(n)) => value_id(current).is_some() && value_id(current) == n.as_u64(),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(b)) => s.parse::<f64>().ok() == b.as_f64(),
        _ => current == desired,
    }
}

/// The subset of `desired` that differs from `record`.
pub fn diff(record: &Record, desired: &Fields) -> Fields {
    desired
        .iter()
        .filter(|(key, value)| !same_value(record.get(key), value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Merges `incoming` into `existing` key by key. Returns the merged mapping only
/// when at least one key changes; keys absent from `incoming` are kept.
pub fn merge_custom_fields(existing: &Fields, incoming: &Fields) -> Option<Fields> {
    let mut merged = existing.clone();
    let mut changed = false;

    for (key, value) in incoming {
        if !same_value(existing.get(key), value) {
            merged.insert(key.clone(), value.clone());
            changed = true;
        }
    }

    changed.then_some(merged)
}
