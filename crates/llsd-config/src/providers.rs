//! Provider expansion.
//!
//! Each capability in the spec holds either one provider object or a list of
//! them. Both normalise to a list of [`ProviderRecord`]s in config form:
//! ids derived from types where absent, types fully qualified, `endpoint`
//! mapped to `config.url`, and secret references replaced by placeholders.

use crate::domain::error::{ConfigError, Result};
use crate::domain::{ProviderConfig, ProviderRecord, ProvidersSpec};
use crate::secrets::{extract_secret_ref, SecretResolution, API_KEY_FIELD};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Qualifier assumed for unqualified provider types.
pub const DEFAULT_QUALIFIER: &str = "remote";
const QUALIFIER_SEPARATOR: &str = "::";

/// `vllm` → `remote::vllm`; qualified types pass through.
pub fn normalize_provider_type(provider: &str) -> String {
    if provider.contains(QUALIFIER_SEPARATOR) {
        provider.to_string()
    } else {
        format!("{}{}{}", DEFAULT_QUALIFIER, QUALIFIER_SEPARATOR, provider)
    }
}

/// Id derived from a type: its last `::` segment.
pub fn generate_provider_id(provider: &str) -> String {
    match provider.rfind(QUALIFIER_SEPARATOR) {
        Some(idx) => provider[idx + QUALIFIER_SEPARATOR.len()..].to_string(),
        None => provider.to_string(),
    }
}

/// One capability's provider input: a single object or a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderInput {
    Single(ProviderConfig),
    Many(Vec<ProviderConfig>),
}

impl ProviderInput {
    /// Interpret `value` as a single provider object or a list of them.
    ///
    /// A list of more than one entry must give every entry an explicit id.
    pub fn parse(path: &str, value: &Value) -> Result<Self> {
        if value.is_object() {
            let single = serde_json::from_value::<ProviderConfig>(value.clone())
                .map_err(|e| ConfigError::malformed(path, e.to_string()))?;
            if single.provider.is_empty() {
                return Err(ConfigError::malformed(
                    path,
                    "expected a provider object with a non-empty 'provider' field or a list of providers",
                ));
            }
            return Ok(ProviderInput::Single(single));
        }

        let items = value.as_array().ok_or_else(|| {
            ConfigError::malformed(
                path,
                "expected a provider object with a non-empty 'provider' field or a list of providers",
            )
        })?;

        let mut list = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let pc: ProviderConfig = serde_json::from_value(item.clone())
                .map_err(|e| ConfigError::malformed(format!("{}[{}]", path, i), e.to_string()))?;
            if pc.provider.is_empty() {
                return Err(ConfigError::malformed(
                    format!("{}[{}]", path, i),
                    "'provider' is required",
                ));
            }
            list.push(pc);
        }

        if list.len() > 1 {
            validate_explicit_ids(path, &list)?;
        }
        Ok(ProviderInput::Many(list))
    }

    /// Canonical list form.
    pub fn into_list(self) -> Vec<ProviderConfig> {
        match self {
            ProviderInput::Single(pc) => vec![pc],
            ProviderInput::Many(list) => list,
        }
    }
}

fn validate_explicit_ids(path: &str, list: &[ProviderConfig]) -> Result<()> {
    for (i, pc) in list.iter().enumerate() {
        if pc.explicit_id().is_some() {
            continue;
        }
        // An id that would be derived may already be taken by a sibling.
        let derived = generate_provider_id(&pc.provider);
        let clash = list
            .iter()
            .enumerate()
            .find(|(j, other)| *j != i && other.effective_id() == derived);
        return Err(match clash {
            Some((j, _)) => ConfigError::DuplicateProviderId {
                id: derived,
                first: format!("{}[{}]", path, i.min(j)),
                second: format!("{}[{}]", path, i.max(j)),
            },
            None => ConfigError::MissingProviderId {
                path: format!("{}[{}]", path, i),
            },
        });
    }
    Ok(())
}

/// Expanded providers, per capability, in declaration order within each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedProviders {
    pub by_capability: BTreeMap<String, Vec<ProviderRecord>>,
    pub count: usize,
}

impl ExpandedProviders {
    pub fn is_empty(&self) -> bool {
        self.by_capability.is_empty()
    }

    /// First provider id declared for `capability`.
    pub fn first_id(&self, capability: &str) -> Option<&str> {
        self.by_capability
            .get(capability)
            .and_then(|list| list.first())
            .map(|p| p.provider_id.as_str())
    }

    /// Every declared provider id.
    pub fn ids(&self) -> Vec<String> {
        self.by_capability
            .values()
            .flat_map(|list| list.iter().map(|p| p.provider_id.clone()))
            .collect()
    }
}

/// Expand every declared capability and check ids are globally unique.
pub fn expand_providers(
    spec: Option<&ProvidersSpec>,
    secrets: &SecretResolution,
) -> Result<ExpandedProviders> {
    let mut expanded = ExpandedProviders::default();
    let Some(spec) = spec else {
        return Ok(expanded);
    };

    // id -> path of the entry that declared it
    let mut origins: HashMap<String, String> = HashMap::new();

    for declared in spec.declared() {
        let path = format!("providers.{}", declared.field);
        let entries = ProviderInput::parse(&path, declared.value)?.into_list();
        let mut records = Vec::with_capacity(entries.len());

        for (i, pc) in entries.iter().enumerate() {
            let record = expand_single(pc, secrets);
            let origin = format!("{}[{}]", path, i);
            if let Some(first) = origins.get(&record.provider_id) {
                return Err(ConfigError::DuplicateProviderId {
                    id: record.provider_id,
                    first: first.clone(),
                    second: origin,
                });
            }
            origins.insert(record.provider_id.clone(), origin);
            records.push(record);
        }

        expanded.count += records.len();
        expanded
            .by_capability
            .insert(declared.capability.to_string(), records);
    }

    Ok(expanded)
}

/// Convert one user entry into config form.
pub fn expand_single(pc: &ProviderConfig, secrets: &SecretResolution) -> ProviderRecord {
    let id = pc.effective_id();
    let mut config = Map::new();

    if let Some(endpoint) = pc.endpoint.as_deref().filter(|e| !e.is_empty()) {
        config.insert("url".into(), Value::String(endpoint.to_string()));
    }
    if pc.api_key.as_ref().is_some_and(|v| !v.is_null()) {
        config.insert(
            "api_key".into(),
            Value::String(secrets.substitution_or_derived(&id, API_KEY_FIELD)),
        );
    }
    if let Some(settings) = &pc.settings {
        for (key, value) in settings {
            let merged = if extract_secret_ref(value).is_some() {
                Value::String(secrets.substitution_or_derived(&id, key))
            } else {
                value.clone()
            };
            config.insert(key.clone(), merged);
        }
    }

    ProviderRecord::new(&id, &normalize_provider_type(&pc.provider), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn providers(v: Value) -> ProvidersSpec {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_normalize_and_generate() {
        assert_eq!(normalize_provider_type("vllm"), "remote::vllm");
        assert_eq!(normalize_provider_type("inline::llama-guard"), "inline::llama-guard");
        assert_eq!(generate_provider_id("remote::vllm"), "vllm");
        assert_eq!(generate_provider_id("vllm"), "vllm");
    }

    #[test]
    fn test_single_object_form() {
        let input = ProviderInput::parse("p", &json!({"provider": "vllm"})).unwrap();
        assert!(matches!(input, ProviderInput::Single(_)));
    }

    #[test]
    fn test_single_element_list_needs_no_id() {
        let input = ProviderInput::parse("p", &json!([{"provider": "vllm"}])).unwrap();
        assert_eq!(input.into_list().len(), 1);
    }

    #[test]
    fn test_object_without_provider_is_malformed() {
        let err = ProviderInput::parse("providers.inference", &json!({"endpoint": "x"})).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedInput { .. }));
        assert!(err.to_string().starts_with("providers.inference:"));
    }

    #[test]
    fn test_object_with_bad_field_reports_decode_error() {
        let err = ProviderInput::parse(
            "providers.inference",
            &json!({"provider": "vllm", "endpoint": 8000}),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("providers.inference:"), "{msg}");
        assert!(msg.contains("invalid type"), "{msg}");
        assert!(!msg.contains("or a list of providers"), "{msg}");
    }

    #[test]
    fn test_list_without_ids_fails() {
        let err = ProviderInput::parse(
            "providers.inference",
            &json!([{"provider": "vllm"}, {"provider": "ollama"}]),
        )
        .unwrap_err();
        match err {
            ConfigError::MissingProviderId { path } => assert_eq!(path, "providers.inference[0]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_list_derived_id_colliding_with_explicit_id() {
        let err = ProviderInput::parse(
            "providers.inference",
            &json!([{"id": "a", "provider": "x"}, {"provider": "a"}]),
        )
        .unwrap_err();
        match err {
            ConfigError::DuplicateProviderId { id, first, second } => {
                assert_eq!(id, "a");
                assert_eq!(first, "providers.inference[0]");
                assert_eq!(second, "providers.inference[1]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_expand_maps_endpoint_api_key_and_settings() {
        let spec = providers(json!({
            "inference": {
                "provider": "openai",
                "endpoint": "https://api.openai.com/v1",
                "apiKey": {"name": "openai", "key": "token"},
                "settings": {
                    "max_tokens": 512,
                    "org": {"secretKeyRef": {"name": "openai", "key": "org"}}
                }
            }
        }));
        // No prior resolution: placeholders are derived.
        let expanded = expand_providers(Some(&spec), &SecretResolution::new()).unwrap();
        let record = &expanded.by_capability["inference"][0];
        assert_eq!(record.provider_id, "openai");
        assert_eq!(record.provider_type, "remote::openai");
        let config = record.config.as_ref().unwrap();
        assert_eq!(config["url"], "https://api.openai.com/v1");
        assert_eq!(config["api_key"], "${env.LLSD_OPENAI_APIKEY}");
        assert_eq!(config["org"], "${env.LLSD_OPENAI_ORG}");
        assert_eq!(config["max_tokens"], 512);
        assert_eq!(expanded.count, 1);
    }

    #[test]
    fn test_cross_capability_duplicate_names_both() {
        let spec = providers(json!({
            "inference": {"id": "shared", "provider": "vllm"},
            "safety": {"id": "shared", "provider": "inline::llama-guard"}
        }));
        let err = expand_providers(Some(&spec), &SecretResolution::new()).unwrap_err();
        match err {
            ConfigError::DuplicateProviderId { first, second, .. } => {
                assert_eq!(first, "providers.inference[0]");
                assert_eq!(second, "providers.safety[0]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_spec_expands_to_nothing() {
        let expanded = expand_providers(None, &SecretResolution::new()).unwrap();
        assert!(expanded.is_empty());
        assert_eq!(expanded.count, 0);
    }
}
