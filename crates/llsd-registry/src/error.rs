//! Error types for llsd-registry

use thiserror::Error;

/// Errors that can occur while talking to a container registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Image reference could not be parsed
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Registry rejected the credentials (or none were found)
    #[error("registry {registry} denied access to {repository}: {detail}")]
    Unauthorized {
        registry: String,
        repository: String,
        detail: String,
    },

    /// Manifest (tag or digest) does not exist
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// Manifest or layer media type is not one we can read
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Neither labelling convention is present on the image
    #[error(
        "image {image} carries no embedded config: set label {base64_label} \
         (base64 config.yaml, at most {max_inline} bytes) or labels {layer_label} + \
         {path_label} (layer digest and in-layer path), or use overrideConfig.configMapName \
         to supply the full config.yaml"
    )]
    MissingConfigLabels {
        image: String,
        base64_label: &'static str,
        layer_label: &'static str,
        path_label: &'static str,
        max_inline: usize,
    },

    /// Inline label exceeds the size bound
    #[error("label {label} is {size} bytes, exceeding the {max} byte limit")]
    InlineConfigTooLarge {
        label: &'static str,
        size: usize,
        max: usize,
    },

    /// Inline label is not valid base64 / UTF-8
    #[error("label {label} is not valid base64-encoded UTF-8: {detail}")]
    InvalidBase64 { label: &'static str, detail: String },

    /// Layer was fetched but the named path is not in it
    #[error("path {path:?} not found in layer {digest}")]
    LayerEntryNotFound { digest: String, path: String },

    /// Layer entry (or the blob carrying it) exceeds the size bound
    #[error("{what} in {digest} is {size} bytes, exceeding the {max} byte limit")]
    ContentTooLarge {
        what: String,
        digest: String,
        size: u64,
        max: u64,
    },

    /// Downloaded content does not match its digest
    #[error("digest mismatch for {expected}: got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// HTTP error (transport, status, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error (layer decompression / archive walk)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (manifests, image config, credentials)
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Http(_) | RegistryError::Io(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_labels_message_names_both_conventions_and_override() {
        let err = RegistryError::MissingConfigLabels {
            image: "quay.io/acme/stack:1".to_string(),
            base64_label: "io.llamastack.config.base64",
            layer_label: "io.llamastack.config.layer",
            path_label: "io.llamastack.config.path",
            max_inline: 50 * 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("io.llamastack.config.base64"));
        assert!(msg.contains("io.llamastack.config.layer"));
        assert!(msg.contains("io.llamastack.config.path"));
        assert!(msg.contains("overrideConfig"));
    }

    #[test]
    fn only_network_failures_are_transient() {
        assert!(RegistryError::Http("timeout".into()).is_transient());
        assert!(!RegistryError::ManifestNotFound("x".into()).is_transient());
    }
}
