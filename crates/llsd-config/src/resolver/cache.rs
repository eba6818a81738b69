//! Digest-keyed cache of parsed base documents.
//!
//! Keys are image digests, never tags, so a tag that moves to a new digest
//! misses the cache. Values for a digest never change once stored; two
//! concurrent misses on the same digest both fetch and the later insert
//! overwrites an identical value.

use crate::domain::BaseConfig;
use dashmap::DashMap;
use std::sync::Arc;

/// Shared handle to the cache. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct DigestCache {
    entries: Arc<DashMap<String, Arc<BaseConfig>>>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache pre-populated with `(digest, config)` pairs.
    pub fn seeded(entries: impl IntoIterator<Item = (String, BaseConfig)>) -> Self {
        let cache = Self::new();
        for (digest, config) in entries {
            cache.insert(&digest, config);
        }
        cache
    }

    pub fn get(&self, digest: &str) -> Option<Arc<BaseConfig>> {
        self.entries.get(digest).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, digest: &str, config: BaseConfig) -> Arc<BaseConfig> {
        let config = Arc::new(config);
        self.entries.insert(digest.to_string(), Arc::clone(&config));
        config
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.entries.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
