// src/utils/serialization.rs
//! Serialization utilities.
//!
//! Two JSON renderings are used:
//! - **canonical**: compact, every object's keys sorted lexicographically. This is what gets
//!   hashed, so it must never depend on construction or iteration order.
//! - **pretty**: indented, for the persisted record files.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{self, Map, Value};

/// Serializes a value to compact canonical JSON bytes.
///
/// Object keys are re-sorted at every depth, so struct field order and map iteration order
/// have no influence on the output.
pub fn canonical_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = sort_keys(serde_json::to_value(data)?);
    serde_json::to_vec(&value)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Serializes a value to indented JSON for the persisted stores.
pub fn to_pretty_json<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Deserializes a value from a JSON string.
pub fn from_json<T: DeserializeOwned>(data: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Serde adapter writing a `Duration` as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
