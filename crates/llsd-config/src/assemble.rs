//! Merge expanded fragments over the base document and render it.

use crate::canonical::{content_hash, render_yaml};
use crate::domain::error::Result;
use crate::domain::{BaseConfig, ProviderRecord, StorageSpec};
use crate::providers::ExpandedProviders;
use crate::resources::ExpandedResources;
use crate::secrets::SecretResolution;
use crate::storage::expand_storage;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Replace the provider list of every capability the user declared.
pub fn merge_providers(config: &mut BaseConfig, providers: &ExpandedProviders) {
    for (capability, records) in &providers.by_capability {
        config.providers.insert(capability.clone(), records.clone());
    }
}

/// Install registrations the spec declared; undeclared kinds keep the base list.
pub fn apply_resources(config: &mut BaseConfig, resources: &ExpandedResources) {
    if let Some(models) = &resources.models {
        config.models = Some(models.clone());
    }
    if let Some(tools) = &resources.tools {
        config.tool_groups = Some(tools.clone());
    }
    if let Some(shields) = &resources.shields {
        config.shields = Some(shields.clone());
    }
}

/// Add externally supplied provider entries, keyed by capability.
///
/// An entry whose `provider_id` matches one already listed for that
/// capability replaces it in place and yields a warning. Capabilities whose
/// value is not a list, and entries that are not provider mappings, are
/// skipped with a warning.
pub fn merge_external_providers(config: &mut BaseConfig, external: &Map<String, Value>) -> Vec<String> {
    let mut warnings = Vec::new();
    for (capability, value) in external {
        let Some(entries) = value.as_array() else {
            warnings.push(format!(
                "external providers for API {:?} must be a list; ignored",
                capability
            ));
            continue;
        };
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("externalProviders.{}[{}]", capability, i);
            let record = match ProviderRecord::from_value(&path, entry) {
                Ok(record) => record,
                Err(e) => {
                    warnings.push(format!("{}; ignored", e));
                    continue;
                }
            };
            let list = config.providers.entry(capability.clone()).or_default();
            let existing = list
                .iter_mut()
                .find(|p| !record.provider_id.is_empty() && p.provider_id == record.provider_id);
            match existing {
                Some(slot) => {
                    warnings.push(format!(
                        "external provider {:?} for API {:?} overrides inline provider with same ID",
                        record.provider_id, capability
                    ));
                    *slot = record;
                }
                None => list.push(record),
            }
        }
    }
    warnings
}

/// Drop each disabled capability from `apis` and from `providers`.
///
/// Names that appear in neither are ignored.
pub fn apply_disabled(config: &mut BaseConfig, disabled: &[String]) {
    if disabled.is_empty() {
        return;
    }
    let set: HashSet<&str> = disabled.iter().map(String::as_str).collect();
    config.apis.retain(|api| !set.contains(api.as_str()));
    for capability in &set {
        if config.providers.remove(*capability).is_some() {
            debug!(capability = %capability, "removed providers for disabled capability");
        }
    }
}

/// Everything the assembler merges over a base document.
#[derive(Debug, Clone, Copy)]
pub struct Fragments<'a> {
    pub providers: &'a ExpandedProviders,
    pub resources: &'a ExpandedResources,
    pub storage: Option<&'a StorageSpec>,
    pub secrets: &'a SecretResolution,
    pub external_providers: Option<&'a Map<String, Value>>,
    pub disabled: &'a [String],
}

/// Build the merged document and collect merge warnings. `base` is left as
/// it was. Disabled capabilities are removed last, external entries included.
pub fn assemble(base: &BaseConfig, fragments: Fragments<'_>) -> Result<(BaseConfig, Vec<String>)> {
    let mut merged = base.clone();
    merge_providers(&mut merged, fragments.providers);
    apply_resources(&mut merged, fragments.resources);
    let mut merged = expand_storage(fragments.storage, &merged, fragments.secrets)?;
    let warnings = fragments
        .external_providers
        .map(|external| merge_external_providers(&mut merged, external))
        .unwrap_or_default();
    apply_disabled(&mut merged, fragments.disabled);
    Ok((merged, warnings))
}

/// Render with sorted keys and hash the exact bytes.
pub fn render(config: &BaseConfig) -> Result<(String, String)> {
    let text = render_yaml(&config.to_document())?;
    let hash = content_hash(&text);
    Ok((text, hash))
}
