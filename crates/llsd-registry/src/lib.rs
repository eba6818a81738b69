//! llsd-registry: reading base configs out of container images
//!
//! Resolves image references to digests and extracts the server config
//! document an image carries in its labels, authenticating the way a
//! cluster node's container runtime would.
//!
//! ## Label conventions
//!
//! - `io.llamastack.config.base64`: inline, base64-encoded document
//! - `io.llamastack.config.layer` + `io.llamastack.config.path`: one layer
//!   digest and the document's path inside it
//! - `io.llamastack.config.version`: informational schema version

pub mod auth;
pub mod client;
pub mod error;
pub mod fakes;
pub mod labels;
pub mod layer;
pub mod reference;
pub mod source;

pub use auth::{Credential, DockerConfig, Keychain};
pub use client::{Platform, RegistryClient, RegistryConfig};
pub use error::RegistryError;
pub use reference::ImageReference;
pub use source::{ConfigOrigin, ExtractedConfig, ImageConfigSource};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
