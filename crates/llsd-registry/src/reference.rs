//! Image reference parsing
//!
//! Accepts the usual `[registry/]repository[:tag][@digest]` forms and
//! normalises Docker Hub shorthand (`ollama/ollama`, `busybox`) the same
//! way a container runtime does.

use crate::error::RegistryError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry host used when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Host that actually serves the Docker Hub distribution API.
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

const DEFAULT_TAG: &str = "latest";

/// A parsed container image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host (with optional port)
    pub registry: String,
    /// Repository path within the registry
    pub repository: String,
    /// Tag, if one was given
    pub tag: Option<String>,
    /// Content digest (`sha256:<hex>`), if one was given
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference string.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (name_and_tag, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest).map_err(|reason| invalid(&reason))?;
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        // A ':' after the last '/' is a tag separator; before it, a port.
        let last_slash = name_and_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_and_tag[last_slash..].rfind(':') {
            Some(idx) => {
                let split = last_slash + idx;
                let tag = &name_and_tag[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("tag is empty"));
                }
                (&name_and_tag[..split], Some(tag.to_string()))
            }
            None => (name_and_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("repository is empty"));
        }
        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository must be lowercase"));
        }

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Host to send distribution API requests to.
    pub fn api_host(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }

    /// The manifest reference: digest when pinned, else tag (default `latest`).
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Copy of this reference pinned to `digest`.
    pub fn with_digest(&self, digest: &str) -> Self {
        ImageReference {
            digest: Some(digest.to_string()),
            ..self.clone()
        }
    }

    /// `registry/repository@digest` form, or the full form when not pinned.
    pub fn pinned(&self) -> String {
        match &self.digest {
            Some(d) => format!("{}/{}@{}", self.registry, self.repository, d),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = RegistryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ImageReference::parse(s)
    }
}

fn validate_digest(digest: &str) -> std::result::Result<(), String> {
    let (algo, hex_part) = digest
        .split_once(':')
        .ok_or_else(|| format!("digest {:?} must be <algorithm>:<hex>", digest))?;
    if algo.is_empty() || hex_part.is_empty() {
        return Err(format!("digest {:?} must be <algorithm>:<hex>", digest));
    }
    if algo == "sha256" && (hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return Err(format!("digest {:?} is not a valid sha256 digest", digest));
    }
    Ok(())
}
