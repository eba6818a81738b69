//! Base configuration document model.
//!
//! The parts of a server config the pipeline rewrites are typed; everything
//! else (server settings, external providers, image name...) rides along in
//! `extra` untouched so it reappears verbatim in the rendered output.

use crate::domain::error::{ConfigError, Result};
use crate::version;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Suffix shared by every store fragment key (`metadata_store`, `inference_store`...).
pub const STORE_SUFFIX: &str = "_store";

/// A provider as it appears under `providers.<capability>`
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    pub provider_id: String,
    pub provider_type: String,
    /// `None` when the base entry had no `config` key
    pub config: Option<Map<String, Value>>,
    /// Other keys on the entry (e.g. `module`)
    pub extra: Map<String, Value>,
}

impl ProviderRecord {
    pub fn new(provider_id: &str, provider_type: &str, config: Map<String, Value>) -> Self {
        ProviderRecord {
            provider_id: provider_id.to_string(),
            provider_type: provider_type.to_string(),
            config: Some(config),
            extra: Map::new(),
        }
    }

    pub(crate) fn from_value(path: &str, value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ConfigError::Document(format!("{}: provider entry must be a mapping", path)))?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        let config = match obj.get("config") {
            None | Some(Value::Null) => None,
            Some(Value::Object(m)) => Some(m.clone()),
            Some(_) => {
                return Err(ConfigError::Document(format!(
                    "{}.config must be a mapping",
                    path
                )))
            }
        };
        let extra = obj
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "provider_id" | "provider_type" | "config"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(ProviderRecord {
            provider_id: text("provider_id"),
            provider_type: text("provider_type"),
            config,
            extra,
        })
    }

    fn to_value(&self) -> Value {
        let mut out = self.extra.clone();
        out.insert("provider_id".into(), Value::String(self.provider_id.clone()));
        out.insert("provider_type".into(), Value::String(self.provider_type.clone()));
        if let Some(config) = &self.config {
            out.insert("config".into(), Value::Object(config.clone()));
        }
        Value::Object(out)
    }
}

/// A parsed base (or merged) config document.
///
/// Owned and cloned freely; expanders work on their own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseConfig {
    pub version: i64,
    /// Enabled capabilities in declaration order
    pub apis: Vec<String>,
    pub providers: BTreeMap<String, Vec<ProviderRecord>>,
    /// Registered models; `None` when the document has no `models` key
    pub models: Option<Vec<Value>>,
    pub shields: Option<Vec<Value>>,
    pub tool_groups: Option<Vec<Value>>,
    /// Store fragments keyed by their top-level name
    pub stores: BTreeMap<String, Map<String, Value>>,
    /// Top-level keys not modelled above
    pub extra: BTreeMap<String, Value>,
    has_apis: bool,
    has_providers: bool,
}

impl BaseConfig {
    /// Empty document at `version`.
    pub fn new(version: i64) -> Self {
        BaseConfig {
            version,
            apis: Vec::new(),
            providers: BTreeMap::new(),
            models: None,
            shields: None,
            tool_groups: None,
            stores: BTreeMap::new(),
            extra: BTreeMap::new(),
            has_apis: false,
            has_providers: false,
        }
    }

    /// Parse YAML document text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_document(&value)
    }

    /// Build from a generic document value.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let top = doc
            .as_object()
            .ok_or_else(|| ConfigError::Document("top level must be a mapping".to_string()))?;
        let version = version::detect_version(top)?;
        let mut config = BaseConfig::new(version);

        for (key, value) in top {
            match key.as_str() {
                "version" => {}
                "apis" => {
                    config.has_apis = true;
                    config.apis = string_list("apis", value)?;
                }
                "providers" => {
                    config.has_providers = true;
                    config.providers = provider_map(value)?;
                }
                "models" => config.models = Some(value_list("models", value)?),
                "shields" => config.shields = Some(value_list("shields", value)?),
                "tool_groups" => config.tool_groups = Some(value_list("tool_groups", value)?),
                k if k.ends_with(STORE_SUFFIX) && value.is_object() => {
                    if let Value::Object(m) = value {
                        config.stores.insert(key.clone(), m.clone());
                    }
                }
                _ => {
                    config.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(config)
    }

    /// Generic document value (key order is settled at render time).
    pub fn to_document(&self) -> Value {
        let mut out = Map::new();
        out.insert("version".into(), Value::from(self.version));
        if self.has_apis || !self.apis.is_empty() {
            out.insert(
                "apis".into(),
                Value::Array(self.apis.iter().cloned().map(Value::String).collect()),
            );
        }
        if self.has_providers || !self.providers.is_empty() {
            let providers: Map<String, Value> = self
                .providers
                .iter()
                .map(|(cap, list)| {
                    (
                        cap.clone(),
                        Value::Array(list.iter().map(ProviderRecord::to_value).collect()),
                    )
                })
                .collect();
            out.insert("providers".into(), Value::Object(providers));
        }
        for (key, list) in [
            ("models", &self.models),
            ("shields", &self.shields),
            ("tool_groups", &self.tool_groups),
        ] {
            if let Some(list) = list {
                out.insert(key.into(), Value::Array(list.clone()));
            }
        }
        for (key, store) in &self.stores {
            out.insert(key.clone(), Value::Object(store.clone()));
        }
        for (key, value) in &self.extra {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }

    /// Provider ids under `capability`, in declaration order.
    pub fn provider_ids(&self, capability: &str) -> Vec<String> {
        self.providers
            .get(capability)
            .map(|list| list.iter().map(|p| p.provider_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Every provider id in the document.
    pub fn all_provider_ids(&self) -> Vec<String> {
        self.providers
            .values()
            .flat_map(|list| list.iter().map(|p| p.provider_id.clone()))
            .collect()
    }

    /// Total number of provider records.
    pub fn provider_count(&self) -> usize {
        self.providers.values().map(Vec::len).sum()
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| ConfigError::Document(format!("{} must be a list of strings", key)))
            })
            .collect(),
        _ => Err(ConfigError::Document(format!("{} must be a list", key))),
    }
}

fn value_list(key: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        _ => Err(ConfigError::Document(format!("{} must be a list", key))),
    }
}

fn provider_map(value: &Value) -> Result<BTreeMap<String, Vec<ProviderRecord>>> {
    let obj = match value {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Object(m) => m,
        _ => return Err(ConfigError::Document("providers must be a mapping".to_string())),
    };
    let mut out = BTreeMap::new();
    for (capability, list) in obj {
        let records = match list {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    ProviderRecord::from_value(&format!("providers.{}[{}]", capability, i), item)
                })
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(ConfigError::Document(format!(
                    "providers.{} must be a list",
                    capability
                )))
            }
        };
        out.insert(capability.clone(), records);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
version: 2
image_name: starter
apis: [inference, safety]
providers:
  inference:
  - provider_id: vllm
    provider_type: remote::vllm
    config:
      url: http://localhost:8000
  safety:
  - provider_id: llama-guard
    provider_type: inline::llama-guard
    module: guard_ext
metadata_store:
  type: sqlite
  db_path: /tmp/kv.db
server:
  port: 8321
"#;

    #[test]
    fn test_parse_typed_and_extra_sections() {
        let base = BaseConfig::from_yaml(DOC).unwrap();
        assert_eq!(base.version, 2);
        assert_eq!(base.apis, vec!["inference", "safety"]);
        assert_eq!(base.provider_ids("inference"), vec!["vllm"]);
        assert_eq!(base.provider_count(), 2);
        assert!(base.stores.contains_key("metadata_store"));
        assert!(base.extra.contains_key("server"));
        assert!(base.extra.contains_key("image_name"));
        assert_eq!(base.models, None);
    }

    #[test]
    fn test_document_round_trip_preserves_unmodelled_keys() {
        let base = BaseConfig::from_yaml(DOC).unwrap();
        let doc = base.to_document();
        assert_eq!(doc["server"]["port"], 8321);
        assert_eq!(doc["providers"]["safety"][0]["module"], "guard_ext");
        assert!(doc["providers"]["safety"][0].get("config").is_none());
        assert_eq!(BaseConfig::from_document(&doc).unwrap(), base);
    }

    #[test]
    fn test_rejects_non_mapping_provider_entry() {
        let err = BaseConfig::from_yaml("version: 2\nproviders:\n  inference: [oops]\n").unwrap_err();
        assert!(err.to_string().contains("providers.inference[0]"));
    }

    #[test]
    fn test_missing_version_is_reported() {
        let err = BaseConfig::from_yaml("apis: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVersion));
    }
}
