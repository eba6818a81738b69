//! The generation entry points.
//!
//! [`generate`] runs the whole pipeline: resolve the base, gate its version,
//! resolve secret references, expand providers then resources, assemble and
//! render. Nothing outside the digest cache is mutated, so a failed run can
//! simply be repeated.

use crate::assemble::{assemble, render, Fragments};
use crate::canonical::content_hash;
use crate::domain::error::Result;
use crate::domain::{BaseConfig, DistributionSpec, GeneratedArtifact};
use crate::metrics::METRICS;
use crate::obs;
use crate::providers::expand_providers;
use crate::resolver::{BaseConfigResolver, BaseOrigin, ResolvedBase};
use crate::resources::expand_resources;
use crate::secrets::{resolve_secrets, SecretResolution};
use crate::version::validate_version;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

/// Where the served config comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Rendered from the spec over the base document
    Generated,
    /// A full document supplied by the user
    Override,
    /// The base document as shipped
    DistributionDefault,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Generated => "generated",
            ConfigSource::Override => "override",
            ConfigSource::DistributionDefault => "distribution_default",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An override wins; any providers, resources, storage, external providers
/// or disabled list means generation; otherwise the distribution default is
/// served.
pub fn config_source(spec: &DistributionSpec) -> ConfigSource {
    if spec.override_config.is_some() {
        ConfigSource::Override
    } else if spec.providers.is_some()
        || spec.resources.is_some()
        || spec.storage.is_some()
        || spec.external_providers.is_some()
        || !spec.disabled.is_empty()
    {
        ConfigSource::Generated
    } else {
        ConfigSource::DistributionDefault
    }
}

/// Full result of one generation run.
#[derive(Debug, Clone)]
pub struct Generation {
    pub artifact: GeneratedArtifact,
    /// Concrete image the distribution runs
    pub image: String,
    pub origin: BaseOrigin,
    /// Secret references the deployer must make available
    pub secrets: SecretResolution,
    /// Non-fatal merge warnings (e.g. an external provider replacing an inline one)
    pub warnings: Vec<String>,
}

/// Generate the config for `spec`: `(artifact, resolved image)`.
pub async fn generate(
    spec: &DistributionSpec,
    resolver: &BaseConfigResolver,
) -> Result<(GeneratedArtifact, String)> {
    let generation = generate_detailed(spec, resolver).await?;
    Ok((generation.artifact, generation.image))
}

/// Like [`generate`], keeping the secret resolution and base origin.
pub async fn generate_detailed(
    spec: &DistributionSpec,
    resolver: &BaseConfigResolver,
) -> Result<Generation> {
    let distribution = spec.distribution.to_string();
    let span = obs::generation_span(&distribution);
    METRICS.inc_generations();

    let outcome = async {
        obs::emit_generation_started(&distribution, ConfigSource::Generated.as_str());
        run_pipeline(spec, resolver).await
    }
    .instrument(span.clone())
    .await;

    let _entered = span.enter();
    match outcome {
        Ok(generation) => {
            obs::emit_generation_finished(
                generation.artifact.hash_prefix(),
                generation.artifact.provider_count,
                generation.artifact.resource_count,
                generation.artifact.schema_version,
            );
            Ok(generation)
        }
        Err(e) => {
            obs::emit_generation_failed(&distribution, &e, e.is_retryable());
            METRICS.inc_generation_failures();
            Err(e)
        }
    }
}

async fn resolve_base(spec: &DistributionSpec, resolver: &BaseConfigResolver) -> Result<ResolvedBase> {
    let resolved = resolver.resolve(&spec.distribution).await?;
    validate_version(resolved.config.version)?;
    obs::emit_base_resolved(&resolved.image, resolved.origin.as_str(), resolved.config.version);
    Ok(resolved)
}

async fn run_pipeline(spec: &DistributionSpec, resolver: &BaseConfigResolver) -> Result<Generation> {
    let resolved = resolve_base(spec, resolver).await?;
    let base = &resolved.config;

    let secrets = resolve_secrets(spec)?;
    let providers = expand_providers(spec.providers.as_ref(), &secrets)?;
    let resources = expand_resources(spec.resources.as_ref(), &providers, base)?;

    let (merged, warnings) = assemble(
        base,
        Fragments {
            providers: &providers,
            resources: &resources,
            storage: spec.storage.as_ref(),
            secrets: &secrets,
            external_providers: spec.external_providers.as_ref(),
            disabled: &spec.disabled,
        },
    )?;
    for warning in &warnings {
        obs::emit_generation_warning(warning);
    }
    let (document, hash) = render(&merged)?;

    let provider_count = if providers.count > 0 {
        providers.count
    } else {
        base.provider_count()
    };

    Ok(Generation {
        artifact: GeneratedArtifact {
            document,
            content_hash: hash,
            provider_count,
            resource_count: resources.count,
            schema_version: base.version,
            env_vars: secrets.env_vars.clone(),
        },
        image: resolved.image,
        origin: resolved.origin,
        secrets,
        warnings,
    })
}

/// Serve the base document as shipped, rendered canonically.
pub async fn distribution_default(
    spec: &DistributionSpec,
    resolver: &BaseConfigResolver,
) -> Result<Generation> {
    let distribution = spec.distribution.to_string();
    obs::emit_generation_started(&distribution, ConfigSource::DistributionDefault.as_str());

    let resolved = resolve_base(spec, resolver)
        .instrument(obs::generation_span(&distribution))
        .await?;
    let (document, hash) = render(&resolved.config)?;

    Ok(Generation {
        artifact: GeneratedArtifact {
            document,
            content_hash: hash,
            provider_count: resolved.config.provider_count(),
            resource_count: 0,
            schema_version: resolved.config.version,
            env_vars: Vec::new(),
        },
        image: resolved.image,
        origin: resolved.origin,
        secrets: SecretResolution::new(),
        warnings: Vec::new(),
    })
}

/// Wrap a user-supplied full document. The text is hashed exactly as given;
/// it is parsed only to gate its version and count its providers.
pub fn artifact_from_override(document: &str) -> Result<GeneratedArtifact> {
    let parsed = BaseConfig::from_yaml(document)?;
    validate_version(parsed.version)?;
    Ok(GeneratedArtifact {
        document: document.to_string(),
        content_hash: content_hash(document),
        provider_count: parsed.provider_count(),
        resource_count: 0,
        schema_version: parsed.version,
        env_vars: Vec::new(),
    })
}
