//! Resource expansion: models, tool groups and shields bound to providers.

use crate::domain::error::{ConfigError, Result};
use crate::domain::{BaseConfig, ModelConfig, ResourcesSpec};
use crate::providers::ExpandedProviders;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Registration entries ready to drop into the config document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedResources {
    /// `None` when the spec declared no models (base list is kept)
    pub models: Option<Vec<Value>>,
    pub tools: Option<Vec<Value>>,
    pub shields: Option<Vec<Value>>,
    pub count: usize,
}

/// First provider id for `capability`: user-declared, else the base document's.
pub fn default_provider(
    capability: &str,
    providers: &ExpandedProviders,
    base: &BaseConfig,
) -> Option<String> {
    providers
        .first_id(capability)
        .map(String::from)
        .or_else(|| base.provider_ids(capability).into_iter().next())
}

/// Provider ids that survive the merge: user ids plus base ids for capabilities
/// the user left alone.
fn known_provider_ids(providers: &ExpandedProviders, base: &BaseConfig) -> BTreeSet<String> {
    let mut known: BTreeSet<String> = providers.ids().into_iter().collect();
    for (capability, records) in &base.providers {
        if !providers.by_capability.contains_key(capability) {
            known.extend(records.iter().map(|p| p.provider_id.clone()));
        }
    }
    known
}

/// Interpret a model entry: a bare name or a `ModelConfig` object.
pub fn parse_model(path: &str, value: &Value) -> Result<ModelConfig> {
    let model = match value {
        Value::String(name) => ModelConfig {
            name: name.clone(),
            ..ModelConfig::default()
        },
        Value::Object(_) => serde_json::from_value::<ModelConfig>(value.clone())
            .map_err(|e| ConfigError::malformed(path, e.to_string()))?,
        _ => {
            return Err(ConfigError::malformed(
                path,
                "expected a model name or an object with a 'name' field",
            ))
        }
    };
    if model.name.is_empty() {
        return Err(ConfigError::malformed(path, "model name is required"));
    }
    Ok(model)
}

fn model_entry(model: &ModelConfig, provider_id: &str) -> Value {
    let mut entry = Map::new();
    entry.insert("model_id".into(), Value::String(model.name.clone()));
    entry.insert("provider_id".into(), Value::String(provider_id.to_string()));

    let mut metadata = Map::new();
    if let Some(len) = model.context_length.filter(|l| *l > 0) {
        entry.insert("provider_model_id".into(), Value::String(model.name.clone()));
        metadata.insert("context_length".into(), Value::from(len));
    }
    if let Some(kind) = model.model_type.as_deref().filter(|s| !s.is_empty()) {
        metadata.insert("model_type".into(), Value::String(kind.to_string()));
    }
    if let Some(q) = model.quantization.as_deref().filter(|s| !s.is_empty()) {
        metadata.insert("quantization".into(), Value::String(q.to_string()));
    }
    if !metadata.is_empty() {
        entry.insert("metadata".into(), Value::Object(metadata));
    }
    Value::Object(entry)
}

fn expand_models(
    entries: &[Value],
    providers: &ExpandedProviders,
    base: &BaseConfig,
) -> Result<Vec<Value>> {
    let fallback = default_provider("inference", providers, base);
    let known = known_provider_ids(providers, base);

    let mut models = Vec::with_capacity(entries.len());
    for (i, raw) in entries.iter().enumerate() {
        let path = format!("resources.models[{}]", i);
        let model = parse_model(&path, raw)?;

        let provider_id = match model.provider.as_deref().filter(|p| !p.is_empty()) {
            Some(explicit) => {
                if !known.contains(explicit) {
                    return Err(ConfigError::UnresolvedProvider {
                        path: format!("{}.provider", path),
                        reference: explicit.to_string(),
                        known: known.iter().cloned().collect(),
                    });
                }
                explicit.to_string()
            }
            None => fallback.clone().ok_or_else(|| ConfigError::NoProviderForCapability {
                path: path.clone(),
                capability: "inference".to_string(),
            })?,
        };
        models.push(model_entry(&model, &provider_id));
    }
    Ok(models)
}

fn bind_names(
    names: &[String],
    field: &str,
    id_key: &str,
    capability: &str,
    providers: &ExpandedProviders,
    base: &BaseConfig,
) -> Result<Vec<Value>> {
    let provider_id = default_provider(capability, providers, base).ok_or_else(|| {
        ConfigError::NoProviderForCapability {
            path: format!("resources.{}", field),
            capability: capability.to_string(),
        }
    })?;
    Ok(names
        .iter()
        .map(|name| {
            let mut entry = Map::new();
            entry.insert(id_key.to_string(), Value::String(name.clone()));
            entry.insert("provider_id".into(), Value::String(provider_id.clone()));
            Value::Object(entry)
        })
        .collect())
}

/// Expand the resource spec against the expanded providers and the base.
///
/// Tools bind to the first `tool_runtime` provider and shields to the first
/// `safety` provider; having none is an error.
pub fn expand_resources(
    spec: Option<&ResourcesSpec>,
    providers: &ExpandedProviders,
    base: &BaseConfig,
) -> Result<ExpandedResources> {
    let mut out = ExpandedResources::default();
    let Some(spec) = spec else {
        return Ok(out);
    };

    if !spec.models.is_empty() {
        let models = expand_models(&spec.models, providers, base)?;
        out.count += models.len();
        out.models = Some(models);
    }
    if !spec.tools.is_empty() {
        let tools = bind_names(&spec.tools, "tools", "toolgroup_id", "tool_runtime", providers, base)?;
        out.count += tools.len();
        out.tools = Some(tools);
    }
    if !spec.shields.is_empty() {
        let shields = bind_names(&spec.shields, "shields", "shield_id", "safety", providers, base)?;
        out.count += shields.len();
        out.shields = Some(shields);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderRecord;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn base() -> BaseConfig {
        let mut base = BaseConfig::new(2);
        base.providers.insert(
            "inference".into(),
            vec![ProviderRecord::new("ollama", "remote::ollama", Map::new())],
        );
        base.providers.insert(
            "safety".into(),
            vec![ProviderRecord::new("llama-guard", "inline::llama-guard", Map::new())],
        );
        base
    }

    fn user_inference(id: &str) -> ExpandedProviders {
        let mut by_capability = BTreeMap::new();
        by_capability.insert(
            "inference".to_string(),
            vec![ProviderRecord::new(id, "remote::vllm", Map::new())],
        );
        ExpandedProviders {
            by_capability,
            count: 1,
        }
    }

    fn resources(v: Value) -> ResourcesSpec {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_string_model_binds_to_first_user_provider() {
        let spec = resources(json!({"models": ["llama3.2-8b"]}));
        let out = expand_resources(Some(&spec), &user_inference("vllm"), &base()).unwrap();
        assert_eq!(
            out.models.unwrap(),
            vec![json!({"model_id": "llama3.2-8b", "provider_id": "vllm"})]
        );
        assert_eq!(out.count, 1);
    }

    #[test]
    fn test_falls_back_to_base_provider() {
        let spec = resources(json!({"models": ["m"]}));
        let out = expand_resources(Some(&spec), &ExpandedProviders::default(), &base()).unwrap();
        assert_eq!(out.models.unwrap()[0]["provider_id"], "ollama");
    }

    #[test]
    fn test_object_model_carries_metadata() {
        let spec = resources(json!({"models": [{
            "name": "llama-70b",
            "provider": "ollama",
            "contextLength": 8192,
            "modelType": "llm",
            "quantization": "q4"
        }]}));
        let out = expand_resources(Some(&spec), &ExpandedProviders::default(), &base()).unwrap();
        let model = &out.models.unwrap()[0];
        assert_eq!(model["provider_model_id"], "llama-70b");
        assert_eq!(model["metadata"]["context_length"], 8192);
        assert_eq!(model["metadata"]["model_type"], "llm");
        assert_eq!(model["metadata"]["quantization"], "q4");
    }

    #[test]
    fn test_unknown_explicit_provider_lists_alternatives() {
        let spec = resources(json!({"models": [{"name": "m", "provider": "nope"}]}));
        let err = expand_resources(Some(&spec), &user_inference("vllm"), &base()).unwrap_err();
        match err {
            ConfigError::UnresolvedProvider { path, known, .. } => {
                assert_eq!(path, "resources.models[0].provider");
                // base inference provider is replaced by the user's
                assert_eq!(known, vec!["llama-guard".to_string(), "vllm".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tools_without_tool_runtime_provider_fail() {
        let spec = resources(json!({"tools": ["builtin::websearch"]}));
        let err = expand_resources(Some(&spec), &ExpandedProviders::default(), &base()).unwrap_err();
        assert!(matches!(err, ConfigError::NoProviderForCapability { ref capability, .. } if capability == "tool_runtime"));
    }

    #[test]
    fn test_shields_bind_to_safety_provider() {
        let spec = resources(json!({"shields": ["llama-guard-3"], "models": ["m"]}));
        let out = expand_resources(Some(&spec), &ExpandedProviders::default(), &base()).unwrap();
        assert_eq!(
            out.shields.unwrap(),
            vec![json!({"shield_id": "llama-guard-3", "provider_id": "llama-guard"})]
        );
        assert_eq!(out.tools, None);
        assert_eq!(out.count, 2);
    }

    #[test]
    fn test_malformed_model_entry() {
        let err = parse_model("resources.models[3]", &json!(42)).unwrap_err();
        assert!(err.to_string().contains("resources.models[3]"));
    }
}
