//! OCI distribution API client
//!
//! Just enough of the registry protocol to read an image's labels and pull a
//! single layer: manifest lookup (tag or digest), multi-platform index
//! resolution, the image config blob and layer blobs. Authentication follows
//! the registry's `WWW-Authenticate` challenge using credentials from a
//! [`Keychain`].

use crate::auth::{parse_challenge, Challenge, Credential, Keychain};
use crate::error::RegistryError;
use crate::reference::ImageReference;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DOCKER_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Target platform used to pick a manifest out of a multi-platform index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
}

impl Default for Platform {
    fn default() -> Self {
        Platform {
            os: "linux".to_string(),
            architecture: "amd64".to_string(),
        }
    }
}

impl Platform {
    /// Parse `os/arch`.
    pub fn parse(value: &str) -> Option<Self> {
        let (os, arch) = value.trim().split_once('/')?;
        if os.is_empty() || arch.is_empty() {
            return None;
        }
        Some(Platform {
            os: os.to_string(),
            architecture: arch.to_string(),
        })
    }
}

/// Registry client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
    /// Registries reached over plain HTTP
    pub insecure_registries: Vec<String>,
    /// Platform selected from multi-platform images
    pub platform: Platform,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("llsd-registry/{}", env!("CARGO_PKG_VERSION")),
            insecure_registries: Vec::new(),
            platform: Platform::default(),
        }
    }
}

impl RegistryConfig {
    /// Defaults overlaid with `LLSD_REGISTRY_TIMEOUT_SECS`,
    /// `LLSD_INSECURE_REGISTRIES` and `LLSD_REGISTRY_PLATFORM`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = std::env::var("LLSD_REGISTRY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(list) = std::env::var("LLSD_INSECURE_REGISTRIES") {
            config.insecure_registries = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(platform) = std::env::var("LLSD_REGISTRY_PLATFORM")
            .ok()
            .and_then(|v| Platform::parse(&v))
        {
            config.platform = platform;
        }
        config
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reach `registry` over plain HTTP
    pub fn with_insecure_registry(mut self, registry: &str) -> Self {
        self.insecure_registries.push(registry.to_string());
        self
    }

    /// Set the platform to select from multi-platform images
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn scheme_for(&self, host: &str) -> &'static str {
        if self.insecure_registries.iter().any(|r| r == host) {
            "http"
        } else {
            "https"
        }
    }
}

/// Manifest body with its media type and content digest
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub media_type: String,
    pub digest: String,
    pub body: Vec<u8>,
}

impl FetchedManifest {
    fn is_index(&self) -> bool {
        self.media_type == OCI_INDEX || self.media_type == DOCKER_LIST
    }
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    digest: String,
    #[serde(default)]
    platform: Option<DescriptorPlatform>,
}

#[derive(Debug, Deserialize)]
struct DescriptorPlatform {
    os: String,
    architecture: String,
}

#[derive(Debug, Deserialize)]
struct ManifestDoc {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    manifests: Option<Vec<Descriptor>>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfigDoc {
    #[serde(default)]
    config: Option<ImageConfigInner>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfigInner {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
enum Auth {
    Anonymous,
    Basic(Credential),
    Bearer(String),
}

/// Largest blob (image config or layer) downloaded in one piece.
pub const MAX_BLOB_BYTES: u64 = 512 * 1024 * 1024;

/// Client for the registry distribution API
pub struct RegistryClient {
    config: RegistryConfig,
    keychain: Keychain,
    http_client: reqwest::Client,
    // "<host>/<repository>" -> negotiated auth
    sessions: Mutex<HashMap<String, Auth>>,
}

impl RegistryClient {
    /// Create a new client
    pub fn new(config: RegistryConfig, keychain: Keychain) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(RegistryClient {
            config,
            keychain,
            http_client,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Client configured from the environment with anonymous access
    pub fn from_env() -> Result<Self> {
        Self::new(RegistryConfig::from_env(), Keychain::anonymous())
    }

    /// Client configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn base_url(&self, reference: &ImageReference) -> String {
        let host = reference.api_host();
        format!(
            "{}://{}/v2/{}",
            self.config.scheme_for(&reference.registry),
            host,
            reference.repository
        )
    }

    fn session_key(reference: &ImageReference) -> String {
        format!("{}/{}", reference.api_host(), reference.repository)
    }

    fn cached_auth(&self, key: &str) -> Auth {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(key).cloned())
            .unwrap_or(Auth::Anonymous)
    }

    fn remember_auth(&self, key: String, auth: Auth) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(key, auth);
        }
    }

    fn build(&self, url: &str, accept: Option<&str>, auth: &Auth) -> reqwest::RequestBuilder {
        let mut req = self.http_client.get(url);
        if let Some(accept) = accept {
            req = req.header(reqwest::header::ACCEPT, accept);
        }
        match auth {
            Auth::Anonymous => req,
            Auth::Basic(cred) => req.basic_auth(&cred.username, Some(&cred.password)),
            Auth::Bearer(token) => req.bearer_auth(token),
        }
    }

    /// GET with challenge-driven authentication, retried once after a 401.
    async fn get(
        &self,
        reference: &ImageReference,
        url: &str,
        accept: Option<&str>,
    ) -> Result<reqwest::Response> {
        let key = Self::session_key(reference);
        let auth = self.cached_auth(&key);
        let response = self.build(url, accept, &auth).send().await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return self.check_access(reference, response);
        }

        let challenge = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_challenge);
        let credential = self.keychain.resolve(&reference.registry);

        let negotiated = match challenge {
            Some(Challenge::Bearer {
                realm,
                service,
                scope,
            }) => {
                let scope =
                    scope.unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
                let token = self
                    .fetch_token(reference, &realm, service.as_deref(), &scope, credential)
                    .await?;
                Auth::Bearer(token)
            }
            Some(Challenge::Basic) => match credential {
                Some(cred) => Auth::Basic(cred),
                None => return Err(self.unauthorized(reference, "basic auth required")),
            },
            None => return Err(self.unauthorized(reference, "unrecognised auth challenge")),
        };

        let response = self.build(url, accept, &negotiated).send().await?;
        self.remember_auth(key, negotiated);
        self.check_access(reference, response)
    }

    async fn fetch_token(
        &self,
        reference: &ImageReference,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        credential: Option<Credential>,
    ) -> Result<String> {
        debug!(realm = %realm, scope = %scope, "requesting registry token");
        let mut query: Vec<(&str, &str)> = vec![("scope", scope)];
        if let Some(service) = service {
            query.push(("service", service));
        }
        let mut req = self.http_client.get(realm).query(&query);
        if let Some(cred) = &credential {
            req = req.basic_auth(&cred.username, Some(&cred.password));
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(self.unauthorized(
                reference,
                &format!("token endpoint returned {}", response.status()),
            ));
        }
        let body: TokenResponse = response.json().await?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| self.unauthorized(reference, "token endpoint returned no token"))
    }

    fn check_access(
        &self,
        reference: &ImageReference,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(self.unauthorized(reference, &format!("status {}", status)));
        }
        Ok(response)
    }

    fn unauthorized(&self, reference: &ImageReference, detail: &str) -> RegistryError {
        RegistryError::Unauthorized {
            registry: reference.registry.clone(),
            repository: reference.repository.clone(),
            detail: detail.to_string(),
        }
    }

    /// Fetch a manifest by tag or digest (whatever `manifest_ref` names).
    pub async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        manifest_ref: &str,
    ) -> Result<FetchedManifest> {
        let url = format!("{}/manifests/{}", self.base_url(reference), manifest_ref);
        let accept = [OCI_INDEX, DOCKER_LIST, OCI_MANIFEST, DOCKER_MANIFEST].join(", ");
        let response = self.get(reference, &url, Some(&accept)).await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::ManifestNotFound(format!(
                "{}/{}:{}",
                reference.registry, reference.repository, manifest_ref
            )));
        }
        if !status.is_success() {
            return Err(RegistryError::Http(format!(
                "manifest request for {} returned {}",
                reference, status
            )));
        }

        let header_digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let body = response.bytes().await?.to_vec();

        let digest = header_digest.unwrap_or_else(|| sha256_digest(&body));
        let doc: ManifestDoc = serde_json::from_slice(&body)?;
        let media_type = header_type
            .filter(|t| !t.is_empty() && t != "application/json")
            .or(doc.media_type)
            .unwrap_or_else(|| {
                if doc.manifests.is_some() {
                    OCI_INDEX.to_string()
                } else {
                    OCI_MANIFEST.to_string()
                }
            });

        Ok(FetchedManifest {
            media_type,
            digest,
            body,
        })
    }

    /// Resolve a reference to the digest it currently points at.
    pub async fn resolve_digest(&self, reference: &ImageReference) -> Result<String> {
        if let Some(digest) = &reference.digest {
            return Ok(digest.clone());
        }
        let manifest = self
            .fetch_manifest(reference, reference.manifest_reference())
            .await?;
        debug!(image = %reference, digest = %manifest.digest, "resolved image digest");
        Ok(manifest.digest)
    }

    /// Labels from the image config of `reference` (platform-resolved).
    pub async fn fetch_labels(&self, reference: &ImageReference) -> Result<HashMap<String, String>> {
        let mut manifest = self
            .fetch_manifest(reference, reference.manifest_reference())
            .await?;

        if manifest.is_index() {
            let doc: ManifestDoc = serde_json::from_slice(&manifest.body)?;
            let entries = doc.manifests.unwrap_or_default();
            let wanted = &self.config.platform;
            let chosen = entries
                .iter()
                .find(|d| {
                    d.platform
                        .as_ref()
                        .map(|p| p.os == wanted.os && p.architecture == wanted.architecture)
                        .unwrap_or(false)
                })
                .or_else(|| entries.first())
                .ok_or_else(|| {
                    RegistryError::ManifestNotFound(format!("{} has an empty image index", reference))
                })?;
            debug!(
                image = %reference,
                platform_manifest = %chosen.digest,
                media_type = ?chosen.media_type,
                "selected platform manifest"
            );
            manifest = self.fetch_manifest(reference, &chosen.digest).await?;
        }

        if manifest.media_type != OCI_MANIFEST && manifest.media_type != DOCKER_MANIFEST {
            return Err(RegistryError::UnsupportedMediaType(manifest.media_type));
        }

        let doc: ManifestDoc = serde_json::from_slice(&manifest.body)?;
        let config = doc.config.ok_or_else(|| {
            RegistryError::UnsupportedMediaType(format!("manifest for {} has no config", reference))
        })?;
        let blob = self.fetch_blob(reference, &config.digest).await?;
        let image_config: ImageConfigDoc = serde_json::from_slice(&blob)?;
        Ok(image_config
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default())
    }

    /// Download one blob and verify it against its digest.
    pub async fn fetch_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = format!("{}/blobs/{}", self.base_url(reference), digest);
        let response = self.get(reference, &url, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Http(format!(
                "blob {} in {} returned {}",
                digest, reference.repository, status
            )));
        }
        if let Some(size) = response.content_length().filter(|n| *n > MAX_BLOB_BYTES) {
            return Err(RegistryError::ContentTooLarge {
                what: "blob".to_string(),
                digest: digest.to_string(),
                size,
                max: MAX_BLOB_BYTES,
            });
        }
        let body = response.bytes().await?.to_vec();

        if digest.starts_with("sha256:") {
            let actual = sha256_digest(&body);
            if actual != digest {
                return Err(RegistryError::DigestMismatch {
                    expected: digest.to_string(),
                    actual,
                });
            }
        }
        info!(repository = %reference.repository, digest = %digest, bytes = body.len(), "fetched blob");
        Ok(body)
    }
}

/// `sha256:<hex>` of `data`
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(
            Platform::parse("linux/arm64"),
            Some(Platform {
                os: "linux".into(),
                architecture: "arm64".into()
            })
        );
        assert_eq!(Platform::parse("linux"), None);
        assert_eq!(Platform::parse("/arm64"), None);
    }

    #[test]
    fn test_scheme_for_insecure_registry() {
        let cfg = RegistryConfig::default().with_insecure_registry("localhost:5000");
        assert_eq!(cfg.scheme_for("localhost:5000"), "http");
        assert_eq!(cfg.scheme_for("quay.io"), "https");
    }

    #[test]
    fn test_base_url_uses_hub_api_host() {
        let client = RegistryClient::new(RegistryConfig::default(), Keychain::anonymous()).unwrap();
        let r = ImageReference::parse("ollama/ollama:latest").unwrap();
        assert_eq!(
            client.base_url(&r),
            "https://registry-1.docker.io/v2/ollama/ollama"
        );
    }

    #[test]
    fn test_sha256_digest_format() {
        let d = sha256_digest(b"");
        assert_eq!(
            d,
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
