//! Pull-credential resolution
//!
//! Mirrors what a node's container runtime does: credentials come from
//! `.dockerconfigjson` documents (image-pull secrets) checked in priority
//! order, falling back to anonymous access when nothing matches.

use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// Username/password pair presented to a registry
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One entry under `auths` in a docker config document
#[derive(Debug, Clone, Default, Deserialize)]
struct DockerAuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
    #[serde(rename = "identitytoken")]
    identity_token: Option<String>,
}

/// A parsed `.dockerconfigjson` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

impl DockerConfig {
    /// Parse a `.dockerconfigjson` payload.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Credential for `registry`, if this document has one.
    pub fn credential_for(&self, registry: &str) -> Option<Credential> {
        let wanted = canonical_registry(registry);
        let mut keys: Vec<&String> = self.auths.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter(|k| canonical_registry(k) == wanted)
            .find_map(|k| self.auths.get(k).and_then(decode_entry))
    }
}

fn decode_entry(entry: &DockerAuthEntry) -> Option<Credential> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Some(Credential {
            username: username.clone(),
            password: password.clone(),
        });
    }
    if let Some(auth) = &entry.auth {
        let decoded = STANDARD.decode(auth.trim()).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (username, password) = text.split_once(':')?;
        return Some(Credential {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    entry.identity_token.as_ref().map(|token| Credential {
        username: "<token>".to_string(),
        password: token.clone(),
    })
}

/// Normalise registry keys: drop scheme and path, fold Docker Hub aliases.
fn canonical_registry(key: &str) -> String {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_ascii_lowercase();
    match host.as_str() {
        "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => {
            "docker.io".to_string()
        }
        _ => host,
    }
}

/// Ordered set of credential sources, consulted first-match-wins
#[derive(Debug, Clone, Default)]
pub struct Keychain {
    sources: Vec<(String, DockerConfig)>,
}

impl Keychain {
    /// A keychain with no sources (anonymous pulls only).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Append a source. Earlier sources take precedence.
    pub fn with_source(mut self, label: &str, config: DockerConfig) -> Self {
        self.sources.push((label.to_string(), config));
        self
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are configured
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Resolve a credential for `registry`; `None` means anonymous.
    pub fn resolve(&self, registry: &str) -> Option<Credential> {
        for (label, config) in &self.sources {
            if let Some(cred) = config.credential_for(registry) {
                debug!(registry = %registry, source = %label, "using pull credential");
                return Some(cred);
            }
        }
        debug!(registry = %registry, "no pull credential found, using anonymous access");
        None
    }
}

/// Authentication scheme requested by a registry's 401 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

fn challenge_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("static regex is valid"))
}

/// Parse a `WWW-Authenticate` header value.
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut values: HashMap<String, String> = challenge_param_re()
        .captures_iter(params)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();

    let realm = values.remove("realm")?;
    Some(Challenge::Bearer {
        realm,
        service: values.remove("service"),
        scope: values.remove("scope"),
    })
}
