//! Base configuration resolution.
//!
//! Maps a distribution reference to a base document and the concrete image
//! it came from:
//!
//! 1. a symbolic name goes through the caller's override table, then the
//!    built-in name→image table
//! 2. names with an embedded document use it directly
//! 3. everything else is read from the image's config labels through an
//!    [`ImageConfigSource`], cached by digest

pub mod cache;

pub use cache::DigestCache;

use crate::domain::error::{ConfigError, Result};
use crate::domain::{BaseConfig, DistributionReference};
use crate::metrics::METRICS;
use crate::obs;
use llsd_registry::{ConfigOrigin, ImageConfigSource, ImageReference};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const DISTRIBUTIONS_JSON: &str = include_str!("../../configs/distributions.json");

/// Base documents shipped with the crate, by distribution name.
const EMBEDDED_DOCUMENTS: &[(&str, &str)] = &[
    (
        "postgres-demo",
        include_str!("../../configs/postgres-demo/config.yaml"),
    ),
    (
        "remote-vllm",
        include_str!("../../configs/remote-vllm/config.yaml"),
    ),
    ("starter", include_str!("../../configs/starter/config.yaml")),
];

/// Names of distributions with an embedded base document, sorted.
pub fn embedded_distribution_names() -> Vec<&'static str> {
    let mut names: Vec<&str> = EMBEDDED_DOCUMENTS.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names
}

/// Embedded document text for `name`.
pub fn embedded_document(name: &str) -> Option<&'static str> {
    EMBEDDED_DOCUMENTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
}

/// The built-in name→image table.
pub fn builtin_distribution_images() -> Result<BTreeMap<String, String>> {
    serde_json::from_str(DISTRIBUTIONS_JSON)
        .map_err(|e| ConfigError::Document(format!("embedded distributions.json: {}", e)))
}

/// Name→image tables used by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Built-in table
    pub distribution_images: BTreeMap<String, String>,
    /// Caller overrides; consulted first
    pub image_overrides: BTreeMap<String, String>,
}

impl ResolverConfig {
    /// Built-in table, no overrides.
    pub fn new() -> Result<Self> {
        Ok(Self {
            distribution_images: builtin_distribution_images()?,
            image_overrides: BTreeMap::new(),
        })
    }

    /// Built-in table plus overrides read from a JSON object file
    /// (`{"starter": "registry.local/starter:1"}`).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let image_overrides: BTreeMap<String, String> = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Document(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            image_overrides,
            ..Self::new()?
        })
    }

    pub fn with_override(mut self, name: &str, image: &str) -> Self {
        self.image_overrides
            .insert(name.to_string(), image.to_string());
        self
    }

    pub fn with_distribution_images(mut self, images: BTreeMap<String, String>) -> Self {
        self.distribution_images = images;
        self
    }

    /// Image for a symbolic name.
    pub fn image_for(&self, name: &str) -> Option<&str> {
        self.image_overrides
            .get(name)
            .or_else(|| self.distribution_images.get(name))
            .map(String::as_str)
    }

    /// Every resolvable name, sorted.
    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .distribution_images
            .keys()
            .chain(self.image_overrides.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Where a resolved base document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseOrigin {
    Embedded,
    /// Extracted from image labels during this call
    Registry { digest: String, origin: ConfigOrigin },
    /// Served from the digest cache
    Cached { digest: String },
}

impl BaseOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseOrigin::Embedded => "embedded",
            BaseOrigin::Registry {
                origin: ConfigOrigin::InlineLabel,
                ..
            } => "inline_label",
            BaseOrigin::Registry {
                origin: ConfigOrigin::Layer { .. },
                ..
            } => "layer",
            BaseOrigin::Cached { .. } => "cache",
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            BaseOrigin::Embedded => None,
            BaseOrigin::Registry { digest, .. } | BaseOrigin::Cached { digest } => Some(digest),
        }
    }
}

/// A resolved base document
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBase {
    /// Owned copy; callers may change it freely
    pub config: BaseConfig,
    /// Concrete image the distribution runs
    pub image: String,
    pub origin: BaseOrigin,
}

/// Resolves distribution references to base documents.
#[derive(Clone)]
pub struct BaseConfigResolver {
    config: ResolverConfig,
    cache: DigestCache,
    source: Option<Arc<dyn ImageConfigSource>>,
}

impl std::fmt::Debug for BaseConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseConfigResolver")
            .field("config", &self.config)
            .field("cached_digests", &self.cache.len())
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl BaseConfigResolver {
    /// A resolver limited to embedded documents until a source is attached.
    pub fn new(config: ResolverConfig, cache: DigestCache) -> Self {
        Self {
            config,
            cache,
            source: None,
        }
    }

    /// Read non-embedded documents from image labels through `source`.
    pub fn with_source(mut self, source: Arc<dyn ImageConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &DigestCache {
        &self.cache
    }

    /// Resolve `reference` to a base document and image.
    pub async fn resolve(&self, reference: &DistributionReference) -> Result<ResolvedBase> {
        match reference {
            DistributionReference::Name(name) => {
                let image = self.config.image_for(name).ok_or_else(|| {
                    ConfigError::UnknownDistribution {
                        name: name.clone(),
                        known: self.config.known_names(),
                    }
                })?;

                if let Some(text) = embedded_document(name) {
                    let config = BaseConfig::from_yaml(text).map_err(|e| {
                        ConfigError::Document(format!("embedded config for {}: {}", name, e))
                    })?;
                    debug!(distribution = %name, image = %image, "using embedded base config");
                    return Ok(ResolvedBase {
                        config,
                        image: image.to_string(),
                        origin: BaseOrigin::Embedded,
                    });
                }
                self.from_registry(image).await
            }
            DistributionReference::Image(image) => self.from_registry(image).await,
        }
    }

    async fn from_registry(&self, image: &str) -> Result<ResolvedBase> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ConfigError::DirectImageRequiresSource {
                image: image.to_string(),
            })?;

        let reference = ImageReference::parse(image)?;
        let digest = source.resolve_digest(&reference).await?;

        if let Some(hit) = self.cache.get(&digest) {
            obs::emit_cache_lookup(&digest, true);
            METRICS.inc_cache_hits();
            return Ok(ResolvedBase {
                config: (*hit).clone(),
                image: image.to_string(),
                origin: BaseOrigin::Cached { digest },
            });
        }
        obs::emit_cache_lookup(&digest, false);
        METRICS.inc_cache_misses();

        let extracted = source.extract_config(&reference.with_digest(&digest)).await?;
        METRICS.inc_registry_extractions();

        let config = BaseConfig::from_yaml(&extracted.document)
            .map_err(|e| ConfigError::Document(format!("config embedded in {}: {}", image, e)))?;
        if let Some(declared) = &extracted.declared_version {
            if declared.trim() != config.version.to_string() {
                warn!(
                    image = %image,
                    label = %declared,
                    document = config.version,
                    "version label disagrees with the embedded document"
                );
            }
        }
        self.cache.insert(&digest, config.clone());

        Ok(ResolvedBase {
            config,
            image: image.to_string(),
            origin: BaseOrigin::Registry {
                digest,
                origin: extracted.origin,
            },
        })
    }
}
