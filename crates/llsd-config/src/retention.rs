//! Naming and retirement of persisted config objects.
//!
//! Each distinct rendered document is stored once, under a name derived from
//! its content hash. Older objects are retired, keeping the newest few so a
//! rollout in flight can still mount the previous one.

use chrono::{DateTime, Utc};

/// Objects kept besides the current one, newest first.
pub const DEFAULT_RETAINED: usize = 2;

const HASH_PREFIX_LEN: usize = 8;

/// `{instance}-config-{first 8 hex of hash}`
pub fn config_object_name(instance: &str, content_hash: &str) -> String {
    let end = content_hash.len().min(HASH_PREFIX_LEN);
    format!("{}-config-{}", instance, &content_hash[..end])
}

/// A persisted config object as listed by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ConfigObject {
    pub fn new(name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            created_at,
        }
    }
}

/// Names of objects to retire: everything except the `keep` newest and
/// `current`. Ties on creation time break by name for a stable answer.
pub fn stale_config_objects(objects: &[ConfigObject], current: &str, keep: usize) -> Vec<String> {
    let mut sorted: Vec<&ConfigObject> = objects.iter().collect();
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    sorted
        .into_iter()
        .enumerate()
        .filter(|(i, obj)| *i >= keep && obj.name != current)
        .map(|(_, obj)| obj.name.clone())
        .collect()
}
