//! The seam between config generation and the registry
//!
//! Config generation only needs two things from an image: the digest a
//! reference currently resolves to, and the embedded config document.
//! [`ImageConfigSource`] captures that; [`RegistryClient`] implements it
//! against a live registry and `fakes::StaticConfigSource` in memory.

use crate::client::RegistryClient;
use crate::labels::{self, ConfigLocation, VERSION_LABEL};
use crate::layer;
use crate::reference::ImageReference;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which labelling convention produced a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOrigin {
    /// Decoded from the inline base64 label
    InlineLabel,
    /// Read from a file inside one layer
    Layer { digest: String, path: String },
}

/// Config document pulled out of an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedConfig {
    /// Raw document text (YAML)
    pub document: String,
    /// How it was found
    pub origin: ConfigOrigin,
    /// Value of the version label, when the image declares one
    pub declared_version: Option<String>,
}

/// Source of base config documents embedded in images
#[async_trait]
pub trait ImageConfigSource: Send + Sync {
    /// Digest the reference currently points at.
    async fn resolve_digest(&self, reference: &ImageReference) -> Result<String>;

    /// Extract the embedded config document from an image (ideally pinned).
    async fn extract_config(&self, reference: &ImageReference) -> Result<ExtractedConfig>;
}

#[async_trait]
impl ImageConfigSource for RegistryClient {
    async fn resolve_digest(&self, reference: &ImageReference) -> Result<String> {
        RegistryClient::resolve_digest(self, reference).await
    }

    async fn extract_config(&self, reference: &ImageReference) -> Result<ExtractedConfig> {
        let image_labels = self.fetch_labels(reference).await?;
        let declared_version = image_labels.get(VERSION_LABEL).cloned();

        match labels::locate_config(&reference.to_string(), &image_labels)? {
            ConfigLocation::Inline(encoded) => {
                debug!(image = %reference, "config found in inline label");
                Ok(ExtractedConfig {
                    document: labels::decode_inline(&encoded)?,
                    origin: ConfigOrigin::InlineLabel,
                    declared_version,
                })
            }
            ConfigLocation::Layer { digest, path } => {
                debug!(image = %reference, layer = %digest, path = %path, "config found in layer");
                let blob = self.fetch_blob(reference, &digest).await?;
                let bytes = layer::extract_entry(&blob, &digest, &path)?;
                let document = String::from_utf8(bytes).map_err(|e| {
                    crate::RegistryError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("{} in layer {} is not UTF-8: {}", path, digest, e),
                    ))
                })?;
                Ok(ExtractedConfig {
                    document,
                    origin: ConfigOrigin::Layer { digest, path },
                    declared_version,
                })
            }
        }
    }
}
