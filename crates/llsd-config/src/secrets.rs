//! Secret reference resolution.
//!
//! Secret values never enter the pipeline. Each reference found in the spec
//! becomes an env var bound to the secret key, and the config document gets
//! a `${env.NAME}` placeholder in its place. References are keyed by an
//! identity token `owner:field`; the first occurrence of a token wins. Two
//! distinct tokens that fold to the same env var name are rejected.
//!
//! Scanned locations: provider `apiKey`, top-level provider `settings`
//! values (nested values are not scanned), `storage.kv.password` and
//! `storage.sql.connectionString`.

use crate::domain::error::{ConfigError, Result};
use crate::domain::{DistributionSpec, EnvVar, SecretKeyRef};
use crate::providers::ProviderInput;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Namespace prefix for generated env var names.
pub const ENV_PREFIX: &str = "LLSD_";
/// Owner id for the key-value store credential.
pub const KV_OWNER: &str = "kv-redis";
/// Owner id for the relational store credential.
pub const SQL_OWNER: &str = "sql-postgres";
/// Field name of a provider's API key.
pub const API_KEY_FIELD: &str = "apiKey";
pub const KV_PASSWORD_FIELD: &str = "password";
pub const SQL_CONNECTION_FIELD: &str = "connectionString";

fn normalize_segment(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `LLSD_<OWNER>_<FIELD>`, uppercased, separators folded to `_`.
pub fn env_var_name(owner: &str, field: &str) -> String {
    format!(
        "{}{}_{}",
        ENV_PREFIX,
        normalize_segment(owner),
        normalize_segment(field)
    )
}

/// Runtime placeholder for an env var.
pub fn placeholder(env_name: &str) -> String {
    format!("${{env.{}}}", env_name)
}

/// `owner:field`
pub fn identity_token(owner: &str, field: &str) -> String {
    format!("{}:{}", owner, field)
}

/// Placeholder derived directly from owner and field.
pub fn derived_placeholder(owner: &str, field: &str) -> String {
    placeholder(&env_var_name(owner, field))
}

/// Recognise `{name, key}` or `{secretKeyRef: {name, key}}`.
pub fn extract_secret_ref(value: &Value) -> Option<SecretKeyRef> {
    let obj = value.as_object()?;
    let pair = |m: &serde_json::Map<String, Value>| {
        let name = m.get("name").and_then(Value::as_str).filter(|s| !s.is_empty())?;
        let key = m.get("key").and_then(Value::as_str).filter(|s| !s.is_empty())?;
        Some(SecretKeyRef {
            name: name.to_string(),
            key: key.to_string(),
        })
    };
    pair(obj).or_else(|| obj.get("secretKeyRef").and_then(Value::as_object).and_then(pair))
}

/// Env bindings plus the identity-token → placeholder map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretResolution {
    pub env_vars: Vec<EnvVar>,
    pub substitutions: BTreeMap<String, String>,
    // env var name -> identity token that claimed it
    claimed: BTreeMap<String, String>,
}

impl SecretResolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference. A token seen before is left as it was; a new
    /// token whose env var name is already bound fails.
    pub fn add(&mut self, owner: &str, field: &str, secret: &SecretKeyRef) -> Result<()> {
        let token = identity_token(owner, field);
        if self.substitutions.contains_key(&token) {
            debug!(token = %token, "secret reference already resolved");
            return Ok(());
        }
        let env_name = env_var_name(owner, field);
        if let Some(first) = self.claimed.get(&env_name) {
            return Err(ConfigError::EnvVarCollision {
                env_name,
                first: first.clone(),
                second: token,
            });
        }
        self.env_vars
            .push(EnvVar::from_secret(&env_name, &secret.name, &secret.key));
        self.substitutions
            .insert(token.clone(), placeholder(&env_name));
        self.claimed.insert(env_name, token);
        Ok(())
    }

    /// Placeholder recorded for `owner:field`.
    pub fn substitution(&self, owner: &str, field: &str) -> Option<&str> {
        self.substitutions
            .get(&identity_token(owner, field))
            .map(String::as_str)
    }

    /// Recorded placeholder, else one derived from the naming convention.
    pub fn substitution_or_derived(&self, owner: &str, field: &str) -> String {
        self.substitution(owner, field)
            .map(String::from)
            .unwrap_or_else(|| derived_placeholder(owner, field))
    }

    /// Distinct `(secret, key)` pairs the env vars point at, sorted.
    pub fn secret_references(&self) -> Vec<SecretKeyRef> {
        self.env_vars
            .iter()
            .map(|e| SecretKeyRef {
                name: e.value_from.secret_key_ref.name.clone(),
                key: e.value_from.secret_key_ref.key.clone(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.env_vars.is_empty()
    }
}

fn required_ref(path: &str, value: &Value) -> Result<SecretKeyRef> {
    extract_secret_ref(value).ok_or_else(|| {
        ConfigError::malformed(
            path,
            "expected a secret reference {name, key} or {secretKeyRef: {name, key}}",
        )
    })
}

/// Scan the whole spec for secret references.
pub fn resolve_secrets(spec: &DistributionSpec) -> Result<SecretResolution> {
    let mut resolution = SecretResolution::new();

    if let Some(providers) = &spec.providers {
        for declared in providers.declared() {
            let path = format!("providers.{}", declared.field);
            let entries = ProviderInput::parse(&path, declared.value)?.into_list();
            for (i, pc) in entries.iter().enumerate() {
                let owner = pc.effective_id();
                if let Some(api_key) = pc.api_key.as_ref().filter(|v| !v.is_null()) {
                    let secret = required_ref(&format!("{}[{}].apiKey", path, i), api_key)?;
                    resolution.add(&owner, API_KEY_FIELD, &secret)?;
                }
                if let Some(settings) = &pc.settings {
                    let mut keys: Vec<&String> = settings.keys().collect();
                    keys.sort();
                    for key in keys {
                        if let Some(secret) = settings.get(key).and_then(extract_secret_ref) {
                            resolution.add(&owner, key, &secret)?;
                        }
                    }
                }
            }
        }
    }

    if let Some(storage) = &spec.storage {
        if let Some(password) = storage
            .kv
            .as_ref()
            .and_then(|kv| kv.password.as_ref())
            .filter(|v| !v.is_null())
        {
            let secret = required_ref("storage.kv.password", password)?;
            resolution.add(KV_OWNER, KV_PASSWORD_FIELD, &secret)?;
        }
        if let Some(conn) = storage
            .sql
            .as_ref()
            .and_then(|sql| sql.connection_string.as_ref())
            .filter(|v| !v.is_null())
        {
            let secret = required_ref("storage.sql.connectionString", conn)?;
            resolution.add(SQL_OWNER, SQL_CONNECTION_FIELD, &secret)?;
        }
    }

    debug!(env_vars = resolution.env_vars.len(), "resolved secret references");
    Ok(resolution)
}
