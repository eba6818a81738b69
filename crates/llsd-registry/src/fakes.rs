//! In-memory image config source (testing only)
//!
//! `StaticConfigSource` maps tags to digests and digests to config documents
//! without any network access. Tags can be re-pointed to simulate a tag
//! moving to a new image.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::labels;
use crate::reference::ImageReference;
use crate::source::{ConfigOrigin, ExtractedConfig, ImageConfigSource};
use crate::Result;

/// In-memory `ImageConfigSource`.
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    tags: Mutex<HashMap<String, String>>,
    documents: Mutex<HashMap<String, String>>,
    extractions: AtomicUsize,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn tag_key(reference: &ImageReference) -> String {
    let tag = reference.tag.as_deref().unwrap_or("latest");
    format!("{}/{}:{}", reference.registry, reference.repository, tag)
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image: `reference` (tagged) resolves to `digest`, whose
    /// config document is `document`.
    pub fn with_image(self, reference: &str, digest: &str, document: &str) -> Result<Self> {
        self.point_tag(reference, digest)?;
        locked(&self.documents).insert(digest.to_string(), document.to_string());
        Ok(self)
    }

    /// Register an image that carries no config labels.
    pub fn with_unlabelled_image(self, reference: &str, digest: &str) -> Result<Self> {
        self.point_tag(reference, digest)?;
        Ok(self)
    }

    /// Move a tag to another digest.
    pub fn point_tag(&self, reference: &str, digest: &str) -> Result<()> {
        let parsed = ImageReference::parse(reference)?;
        locked(&self.tags).insert(tag_key(&parsed), digest.to_string());
        Ok(())
    }

    /// Add or replace the document behind a digest.
    pub fn put_document(&self, digest: &str, document: &str) {
        locked(&self.documents).insert(digest.to_string(), document.to_string());
    }

    /// How many times `extract_config` has been called.
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageConfigSource for StaticConfigSource {
    async fn resolve_digest(&self, reference: &ImageReference) -> Result<String> {
        if let Some(digest) = &reference.digest {
            return Ok(digest.clone());
        }
        locked(&self.tags)
            .get(&tag_key(reference))
            .cloned()
            .ok_or_else(|| RegistryError::ManifestNotFound(reference.to_string()))
    }

    async fn extract_config(&self, reference: &ImageReference) -> Result<ExtractedConfig> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        let digest = self.resolve_digest(reference).await?;
        let document = locked(&self.documents)
            .get(&digest)
            .cloned()
            .ok_or_else(|| labels::missing_labels(&reference.to_string()))?;
        Ok(ExtractedConfig {
            document,
            origin: ConfigOrigin::InlineLabel,
            declared_version: None,
        })
    }
}
