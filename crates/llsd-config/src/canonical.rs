//! Deterministic rendering and content hashing.
//!
//! Map keys are sorted explicitly at every level before serialising, so the
//! output does not depend on how the map type happens to iterate. Lists keep
//! their order.

use crate::domain::error::{ConfigError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively rebuild `value` with object keys in ascending order.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Render a document as YAML with sorted keys.
pub fn render_yaml(doc: &Value) -> Result<String> {
    serde_yaml::to_string(&sort_keys(doc)).map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// sha256 hex digest of rendered text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
