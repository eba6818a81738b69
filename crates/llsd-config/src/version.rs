//! Config schema version gate.
//!
//! Extraction and validation are separate steps so callers can tell a
//! document with no usable version apart from one with an unsupported one.

use crate::domain::error::{ConfigError, Result};
use serde_json::{Map, Value};

/// Oldest supported schema version (n-1).
pub const MIN_SUPPORTED_VERSION: i64 = 1;
/// Current schema version (n).
pub const MAX_SUPPORTED_VERSION: i64 = 2;

/// Read the top-level `version` key.
///
/// Both integers and floats (as produced by generic decoders) are accepted;
/// floats are truncated.
pub fn detect_version(doc: &Map<String, Value>) -> Result<i64> {
    let raw = doc.get("version").ok_or(ConfigError::MissingVersion)?;
    match raw {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v)
            } else if let Some(v) = n.as_u64() {
                i64::try_from(v).map_err(|_| ConfigError::UnsupportedVersion {
                    version: i64::MAX,
                    supported: supported_versions(),
                })
            } else {
                Ok(n.as_f64().map(|f| f.trunc() as i64).unwrap_or_default())
            }
        }
        Value::Null => Err(ConfigError::InvalidVersionType("null".to_string())),
        Value::Bool(_) => Err(ConfigError::InvalidVersionType("bool".to_string())),
        Value::String(_) => Err(ConfigError::InvalidVersionType("string".to_string())),
        Value::Array(_) => Err(ConfigError::InvalidVersionType("list".to_string())),
        Value::Object(_) => Err(ConfigError::InvalidVersionType("mapping".to_string())),
    }
}

/// Check `version` against the supported range.
pub fn validate_version(version: i64) -> Result<()> {
    if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
        return Err(ConfigError::UnsupportedVersion {
            version,
            supported: supported_versions(),
        });
    }
    Ok(())
}

/// Every supported version, ascending.
pub fn supported_versions() -> Vec<i64> {
    (MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).collect()
}
