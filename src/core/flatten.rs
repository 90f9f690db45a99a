//! Payload flattening
//!
//! Nested objects become single-level keys joined with `_`, so
//! `{"diskstats": {"rd_bytes": 5}}` yields `diskstats_rd_bytes = 5`.
//! Arrays are values in their own right and are never descended into.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::events::FieldValue;

pub const SEPARATOR: char = '_';

/// Flatten a JSON object into a single-level mapping
pub fn flatten(map: &Map<String, Value>) -> BTreeMap<String, FieldValue> {
    let mut out = BTreeMap::new();
    flatten_into(&mut out, None, map);
    out
}

fn flatten_into(
    out: &mut BTreeMap<String, FieldValue>,
    prefix: Option<&str>,
    map: &Map<String, Value>,
) {
    for (key, value) in map {
        let name = match prefix {
            Some(prefix) => format!("{prefix}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&name), inner),
            other => {
                if let Some(field) = FieldValue::from_json(other) {
                    out.insert(name, field);
                }
            }
        }
    }
}
