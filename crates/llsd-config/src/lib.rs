//! LLSD config generation
//!
//! Turns a declarative distribution spec into a rendered server config
//! document, its content hash and the secret-backed env vars needed to run
//! it.

pub mod assemble;
pub mod canonical;
pub mod domain;
pub mod expose;
pub mod generate;
pub mod metrics;
pub mod obs;
pub mod providers;
pub mod resolver;
pub mod resources;
pub mod retention;
pub mod secrets;
pub mod storage;
pub mod telemetry;
pub mod version;

pub use domain::{
    BaseConfig, ConfigError, DistributionReference, DistributionSpec, EnvVar, GeneratedArtifact,
    ProviderConfig, ProviderRecord, ProvidersSpec, ResourcesSpec, Result, SecretKeyRef,
    StorageSpec,
};

pub use generate::{
    artifact_from_override, config_source, distribution_default, generate, generate_detailed,
    ConfigSource, Generation,
};

pub use resolver::{
    builtin_distribution_images, embedded_distribution_names, BaseConfigResolver, BaseOrigin,
    DigestCache, ResolvedBase, ResolverConfig,
};

pub use providers::{
    expand_providers, generate_provider_id, normalize_provider_type, ExpandedProviders,
    ProviderInput,
};
pub use assemble::merge_external_providers;
pub use resources::{expand_resources, ExpandedResources};
pub use secrets::{resolve_secrets, SecretResolution};
pub use storage::expand_storage;

pub use expose::{parse_expose, ExposeSetting, DEFAULT_SERVER_PORT};
pub use retention::{config_object_name, stale_config_objects, ConfigObject, DEFAULT_RETAINED};
pub use version::{detect_version, supported_versions, validate_version};

pub use metrics::METRICS;
pub use telemetry::init_tracing;
