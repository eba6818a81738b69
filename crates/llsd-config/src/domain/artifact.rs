//! Pipeline output.

use serde::{Deserialize, Serialize};

/// Secret/key pair an env var is populated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    pub secret_key_ref: SecretKeySelector,
}

/// Environment variable the served workload needs, bound to a secret key.
///
/// Serialises in the same shape as a container `env` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value_from: EnvVarSource,
}

impl EnvVar {
    pub fn from_secret(name: &str, secret: &str, key: &str) -> Self {
        EnvVar {
            name: name.to_string(),
            value_from: EnvVarSource {
                secret_key_ref: SecretKeySelector {
                    name: secret.to_string(),
                    key: key.to_string(),
                },
            },
        }
    }
}

/// A rendered config document and what a deployer needs to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Rendered YAML
    pub document: String,
    /// sha256 hex of `document`
    pub content_hash: String,
    pub provider_count: usize,
    pub resource_count: usize,
    pub schema_version: i64,
    /// Secret-backed env vars, one per distinct secret reference
    pub env_vars: Vec<EnvVar>,
}

impl GeneratedArtifact {
    /// First 8 hex characters of the content hash.
    pub fn hash_prefix(&self) -> &str {
        let end = self.content_hash.len().min(8);
        &self.content_hash[..end]
    }
}
