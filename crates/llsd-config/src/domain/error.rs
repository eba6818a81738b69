//! Error taxonomy for config generation.
//!
//! Every message is meant to be surfaced verbatim in user-facing status, so
//! each names the offending input and, where there is a fixed set of valid
//! choices, lists them.

use llsd_registry::RegistryError;

/// Config generation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown distribution name {name:?}; known distributions: [{}]", .known.join(", "))]
    UnknownDistribution { name: String, known: Vec<String> },

    #[error(
        "direct image reference {image} requires either overrideConfig.configMapName or \
         config labels on the image (io.llamastack.config.base64, or \
         io.llamastack.config.layer + io.llamastack.config.path)"
    )]
    DirectImageRequiresSource { image: String },

    #[error("{path}: provider {reference:?} does not exist; available providers: [{}]", .known.join(", "))]
    UnresolvedProvider {
        path: String,
        reference: String,
        known: Vec<String>,
    },

    #[error("{path}: requires at least one {capability} provider to be configured")]
    NoProviderForCapability { path: String, capability: String },

    #[error("duplicate provider id {id:?}: declared by {first} and {second}")]
    DuplicateProviderId {
        id: String,
        first: String,
        second: String,
    },

    #[error("{path}: must have an explicit 'id' when multiple providers are specified")]
    MissingProviderId { path: String },

    #[error(
        "secret references {first} and {second} both map to env var {env_name}; \
         rename one of the providers or settings keys"
    )]
    EnvVarCollision {
        env_name: String,
        first: String,
        second: String,
    },

    #[error("{path}: {reason}")]
    MalformedInput { path: String, reason: String },

    #[error("config missing required 'version' field")]
    MissingVersion,

    #[error("invalid config version type: {0} (expected integer)")]
    InvalidVersionType(String),

    #[error("config version {version} is not supported; supported versions: {supported:?}")]
    UnsupportedVersion { version: i64, supported: Vec<i64> },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid config document: {0}")]
    Document(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Whether a later attempt with the same input could succeed.
    ///
    /// Only registry transport failures qualify; everything else needs the
    /// input (or the image) to change.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConfigError::Registry(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Document(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serialization(err.to_string())
    }
}

/// Result type for config generation.
pub type Result<T> = std::result::Result<T, ConfigError>;
