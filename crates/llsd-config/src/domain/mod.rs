//! Domain models for config generation.
//!
//! - `DistributionSpec`: the declarative input
//! - `BaseConfig`: a parsed config document (base or merged)
//! - `GeneratedArtifact`: the rendered output plus its env bindings

pub mod artifact;
pub mod base;
pub mod error;
pub mod spec;

pub use artifact::{EnvVar, EnvVarSource, GeneratedArtifact, SecretKeySelector};
pub use base::{BaseConfig, ProviderRecord, STORE_SUFFIX};
pub use error::{ConfigError, Result};
pub use spec::{
    DeclaredCapability, DistributionReference, DistributionSpec, KvStorageSpec, ModelConfig,
    NetworkingSpec, OverrideConfigSpec, ProviderConfig, ProvidersSpec, ResourcesSpec,
    SecretKeyRef, SqlStorageSpec, StorageSpec, CAPABILITIES,
};
