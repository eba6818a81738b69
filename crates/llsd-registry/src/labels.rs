//! Image label conventions for embedded base configs
//!
//! Two conventions are recognised, checked in this order:
//!
//! 1. `io.llamastack.config.base64`: the whole `config.yaml`, base64 encoded,
//!    inline in the label (bounded by [`MAX_INLINE_CONFIG_BYTES`]).
//! 2. `io.llamastack.config.layer` + `io.llamastack.config.path`: the digest of
//!    one image layer and the path of the config file inside it.

use crate::error::RegistryError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;

/// Inline base64 config document
pub const BASE64_LABEL: &str = "io.llamastack.config.base64";
/// Digest of the layer carrying the config document
pub const LAYER_LABEL: &str = "io.llamastack.config.layer";
/// Path of the config document inside that layer
pub const PATH_LABEL: &str = "io.llamastack.config.path";
/// Schema version of the embedded document (informational)
pub const VERSION_LABEL: &str = "io.llamastack.config.version";

/// Upper bound on the inline label value.
pub const MAX_INLINE_CONFIG_BYTES: usize = 50 * 1024;

/// Where an image keeps its config document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Encoded document carried in the label itself
    Inline(String),
    /// A single layer blob and a path within it
    Layer { digest: String, path: String },
}

/// Pick the config location from an image's labels.
pub fn locate_config(image: &str, labels: &HashMap<String, String>) -> Result<ConfigLocation> {
    if let Some(encoded) = labels.get(BASE64_LABEL).filter(|v| !v.trim().is_empty()) {
        if encoded.len() > MAX_INLINE_CONFIG_BYTES {
            return Err(RegistryError::InlineConfigTooLarge {
                label: BASE64_LABEL,
                size: encoded.len(),
                max: MAX_INLINE_CONFIG_BYTES,
            });
        }
        return Ok(ConfigLocation::Inline(encoded.clone()));
    }

    let layer = labels.get(LAYER_LABEL).filter(|v| !v.trim().is_empty());
    let path = labels.get(PATH_LABEL).filter(|v| !v.trim().is_empty());
    if let (Some(digest), Some(path)) = (layer, path) {
        return Ok(ConfigLocation::Layer {
            digest: digest.trim().to_string(),
            path: path.trim().to_string(),
        });
    }

    Err(missing_labels(image))
}

/// The actionable error for an image with neither convention.
pub fn missing_labels(image: &str) -> RegistryError {
    RegistryError::MissingConfigLabels {
        image: image.to_string(),
        base64_label: BASE64_LABEL,
        layer_label: LAYER_LABEL,
        path_label: PATH_LABEL,
        max_inline: MAX_INLINE_CONFIG_BYTES,
    }
}

/// Decode the inline label value into document text.
pub fn decode_inline(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RegistryError::InvalidBase64 {
            label: BASE64_LABEL,
            detail: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| RegistryError::InvalidBase64 {
        label: BASE64_LABEL,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_inline_label_takes_precedence() {
        let l = labels(&[
            (BASE64_LABEL, "dmVyc2lvbjogMgo="),
            (LAYER_LABEL, "sha256:abc"),
            (PATH_LABEL, "/app/config.yaml"),
        ]);
        assert_eq!(
            locate_config("img", &l).unwrap(),
            ConfigLocation::Inline("dmVyc2lvbjogMgo=".into())
        );
    }

    #[test]
    fn test_layer_pair_used_when_no_inline() {
        let l = labels(&[(LAYER_LABEL, "sha256:abc"), (PATH_LABEL, "app/config.yaml")]);
        assert_eq!(
            locate_config("img", &l).unwrap(),
            ConfigLocation::Layer {
                digest: "sha256:abc".into(),
                path: "app/config.yaml".into()
            }
        );
    }

    #[test]
    fn test_half_a_layer_pair_is_missing() {
        let l = labels(&[(LAYER_LABEL, "sha256:abc")]);
        let err = locate_config("quay.io/x/y:1", &l).unwrap_err();
        assert!(matches!(err, RegistryError::MissingConfigLabels { .. }));
        assert!(err.to_string().contains("quay.io/x/y:1"));
    }

    #[test]
    fn test_oversized_inline_label_rejected() {
        let big = "A".repeat(MAX_INLINE_CONFIG_BYTES + 4);
        let l = labels(&[(BASE64_LABEL, big.as_str())]);
        assert!(matches!(
            locate_config("img", &l),
            Err(RegistryError::InlineConfigTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_inline() {
        assert_eq!(decode_inline("dmVyc2lvbjogMgo=").unwrap(), "version: 2\n");
        assert_eq!(decode_inline("dmVyc2lv\nbjogMgo=").unwrap(), "version: 2\n");
        assert!(matches!(
            decode_inline("not base64!!"),
            Err(RegistryError::InvalidBase64 { .. })
        ));
    }
}
