//! Declarative distribution spec: the input to config generation.
//!
//! Structural validation (required fields, enum values) happens before this
//! crate sees the input. Fields whose shape is polymorphic (providers,
//! models, secret references, expose) are kept as raw JSON values here and
//! interpreted by the expander that owns them.

use crate::domain::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability keys in declaration order: (spec field, config section).
pub const CAPABILITIES: [(&str, &str); 5] = [
    ("inference", "inference"),
    ("safety", "safety"),
    ("vectorIo", "vector_io"),
    ("toolRuntime", "tool_runtime"),
    ("telemetry", "telemetry"),
];

/// Which distribution to deploy: exactly one of a symbolic name or an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DistributionSelector", into = "DistributionSelector")]
pub enum DistributionReference {
    /// Symbolic name resolved through the name→image table
    Name(String),
    /// Direct image reference
    Image(String),
}

/// Wire shape of `distribution`: `{name}` or `{image}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DistributionSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

impl TryFrom<DistributionSelector> for DistributionReference {
    type Error = String;

    fn try_from(sel: DistributionSelector) -> std::result::Result<Self, Self::Error> {
        let name = sel.name.filter(|n| !n.is_empty());
        let image = sel.image.filter(|i| !i.is_empty());
        match (name, image) {
            (Some(name), None) => Ok(DistributionReference::Name(name)),
            (None, Some(image)) => Ok(DistributionReference::Image(image)),
            (Some(_), Some(_)) => {
                Err("only one of distribution.name or distribution.image may be set".to_string())
            }
            (None, None) => {
                Err("one of distribution.name or distribution.image is required".to_string())
            }
        }
    }
}

impl From<DistributionReference> for DistributionSelector {
    fn from(reference: DistributionReference) -> Self {
        match reference {
            DistributionReference::Name(name) => DistributionSelector {
                name: Some(name),
                image: None,
            },
            DistributionReference::Image(image) => DistributionSelector {
                name: None,
                image: Some(image),
            },
        }
    }
}

impl std::fmt::Display for DistributionReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionReference::Name(name) => write!(f, "{}", name),
            DistributionReference::Image(image) => write!(f, "{}", image),
        }
    }
}

/// A reference to one key of a named secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Providers by capability; each value is a single provider object or a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_io: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_runtime: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Value>,
}

/// One declared capability from a `ProvidersSpec`
#[derive(Debug, Clone, Copy)]
pub struct DeclaredCapability<'a> {
    /// Field name in the declarative spec (`toolRuntime`)
    pub field: &'static str,
    /// Section name in the rendered config (`tool_runtime`)
    pub capability: &'static str,
    pub value: &'a Value,
}

impl ProvidersSpec {
    fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "inference" => self.inference.as_ref(),
            "safety" => self.safety.as_ref(),
            "vectorIo" => self.vector_io.as_ref(),
            "toolRuntime" => self.tool_runtime.as_ref(),
            "telemetry" => self.telemetry.as_ref(),
            _ => None,
        }
    }

    /// Declared capabilities, in fixed declaration order. `null` counts as absent.
    pub fn declared(&self) -> Vec<DeclaredCapability<'_>> {
        CAPABILITIES
            .iter()
            .filter_map(|&(field, capability)| {
                self.field(field)
                    .filter(|v| !v.is_null())
                    .map(|value| DeclaredCapability {
                        field,
                        capability,
                        value,
                    })
            })
            .collect()
    }
}

/// A single provider entry as the user wrote it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider type, e.g. `vllm` or `inline::llama-guard`
    #[serde(default, alias = "type")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Secret reference for the provider's API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<Value>,
    /// Passthrough settings merged into the provider config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

impl ProviderConfig {
    /// The explicit id, if one was given and is non-empty.
    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Explicit id, else the id derived from the provider type.
    pub fn effective_id(&self) -> String {
        match self.explicit_id() {
            Some(id) => id.to_string(),
            None => crate::providers::generate_provider_id(&self.provider),
        }
    }
}

/// Models, tools and shields to register
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesSpec {
    /// Each entry is a model name or a `ModelConfig` object
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shields: Vec<String>,
}

/// Object form of a model entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
}

/// Key-value store intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvStorageSpec {
    /// `sqlite` (default) or `redis`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Value>,
}

/// Relational store intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlStorageSpec {
    /// `sqlite` (default) or `postgres`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<Value>,
}

/// Storage intent for the served runtime's state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kv: Option<KvStorageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<SqlStorageSpec>,
}

/// A user-supplied full config document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfigSpec {
    pub config_map_name: String,
}

/// Networking knobs that travel with the spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// `true`/`false`, `{}` or `{enabled, hostname}`; see [`crate::expose::parse_expose`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<Value>,
}

/// The full declarative input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSpec {
    pub distribution: DistributionReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<ProvidersSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,
    /// Capabilities to remove from the rendered config
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_config: Option<OverrideConfigSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<NetworkingSpec>,
    /// Fully formed provider entries by capability, merged after expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_providers: Option<Map<String, Value>>,
}

impl DistributionSpec {
    /// A spec that only names a distribution.
    pub fn for_distribution(distribution: DistributionReference) -> Self {
        DistributionSpec {
            distribution,
            providers: None,
            resources: None,
            storage: None,
            disabled: Vec::new(),
            override_config: None,
            networking: None,
            external_providers: None,
        }
    }

    /// Parse a spec from YAML (or JSON, which is valid YAML).
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::malformed("spec", e.to_string()))
    }
}
