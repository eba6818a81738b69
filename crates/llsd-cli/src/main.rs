//! LLSD - distribution config generation CLI
//!
//! ## Commands
//!
//! - `generate`: render the server config for a distribution spec
//! - `distributions`: list known distribution names and their images
//! - `inspect-image`: show the config document an image carries in its labels
//! - `check-version`: check a config document's schema version

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use llsd_config::{
    artifact_from_override, config_object_name, config_source, distribution_default,
    embedded_distribution_names, generate_detailed, supported_versions, validate_version,
    BaseConfig, BaseConfigResolver, ConfigSource, DigestCache, DistributionSpec, EnvVar,
    Generation, ResolverConfig, SecretKeyRef, METRICS,
};
use llsd_registry::{
    DockerConfig, ImageConfigSource, ImageReference, Keychain, RegistryClient, RegistryConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "llsd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate server configs for inference-serving distributions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "LLSD_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the server config for a distribution spec
    Generate {
        /// Distribution spec (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Write the rendered document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Instance name used to derive the config object name
        #[arg(short, long, default_value = "llsd")]
        instance: String,

        /// JSON object of distribution name -> image overrides
        #[arg(long)]
        image_overrides: Option<PathBuf>,

        /// Pull-credential documents (.dockerconfigjson), highest priority first
        #[arg(long = "docker-config")]
        docker_configs: Vec<PathBuf>,

        /// Full config document served when the spec sets overrideConfig
        #[arg(long = "override")]
        override_document: Option<PathBuf>,
    },

    /// List known distribution names and their images
    Distributions {
        /// JSON object of distribution name -> image overrides
        #[arg(long)]
        image_overrides: Option<PathBuf>,
    },

    /// Show the config document embedded in an image's labels
    InspectImage {
        /// Image reference, e.g. quay.io/org/distribution:tag
        reference: String,

        /// Pull-credential documents (.dockerconfigjson), highest priority first
        #[arg(long = "docker-config")]
        docker_configs: Vec<PathBuf>,
    },

    /// Check the schema version of a config document
    CheckVersion {
        /// Config document (YAML)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    llsd_config::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Generate {
            spec,
            output,
            instance,
            image_overrides,
            docker_configs,
            override_document,
        } => {
            cmd_generate(GenerateArgs {
                spec: &spec,
                output: output.as_deref(),
                instance: &instance,
                image_overrides: image_overrides.as_deref(),
                docker_configs: &docker_configs,
                override_document: override_document.as_deref(),
            })
            .await
        }
        Commands::Distributions { image_overrides } => {
            cmd_distributions(image_overrides.as_deref())
        }
        Commands::InspectImage {
            reference,
            docker_configs,
        } => cmd_inspect_image(&reference, &docker_configs).await,
        Commands::CheckVersion { file } => cmd_check_version(&file),
    };

    METRICS.flush();
    outcome
}

/// Keychain from `.dockerconfigjson` files, in the order given.
fn build_keychain(paths: &[PathBuf]) -> Result<Keychain> {
    let mut keychain = Keychain::anonymous();
    for path in paths {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read docker config: {}", path.display()))?;
        let config = DockerConfig::from_json(&data)
            .with_context(|| format!("Invalid docker config: {}", path.display()))?;
        keychain = keychain.with_source(&path.display().to_string(), config);
    }
    Ok(keychain)
}

fn resolver_config(image_overrides: Option<&Path>) -> Result<ResolverConfig> {
    match image_overrides {
        Some(path) => ResolverConfig::from_json_file(path)
            .with_context(|| format!("Failed to load image overrides: {}", path.display())),
        None => ResolverConfig::new().context("Failed to load built-in distribution table"),
    }
}

fn registry_client(docker_configs: &[PathBuf]) -> Result<RegistryClient> {
    let keychain = build_keychain(docker_configs)?;
    RegistryClient::new(RegistryConfig::from_env(), keychain)
        .context("Failed to build registry client")
}

struct GenerateArgs<'a> {
    spec: &'a Path,
    output: Option<&'a Path>,
    instance: &'a str,
    image_overrides: Option<&'a Path>,
    docker_configs: &'a [PathBuf],
    override_document: Option<&'a Path>,
}

/// What `generate` reports alongside the document.
#[derive(Debug, Serialize)]
struct GenerateSummary {
    source: ConfigSource,
    object_name: String,
    content_hash: String,
    image: Option<String>,
    provider_count: usize,
    resource_count: usize,
    schema_version: i64,
    env_vars: Vec<EnvVar>,
    secret_references: Vec<SecretKeyRef>,
    warnings: Vec<String>,
}

async fn cmd_generate(args: GenerateArgs<'_>) -> Result<()> {
    let text = std::fs::read_to_string(args.spec)
        .with_context(|| format!("Failed to read spec: {}", args.spec.display()))?;
    let spec = DistributionSpec::from_yaml(&text)
        .with_context(|| format!("Invalid spec: {}", args.spec.display()))?;

    let source = config_source(&spec);
    info!(source = %source, distribution = %spec.distribution, "generating config");

    let (artifact, image, secret_references, warnings) = match source {
        ConfigSource::Override => {
            let Some(path) = args.override_document else {
                let name = spec
                    .override_config
                    .as_ref()
                    .map(|o| o.config_map_name.as_str())
                    .unwrap_or_default();
                bail!(
                    "spec sets overrideConfig.configMapName={:?}; pass its config.yaml with --override",
                    name
                );
            };
            let document = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read override: {}", path.display()))?;
            (artifact_from_override(&document)?, None, Vec::new(), Vec::new())
        }
        ConfigSource::Generated | ConfigSource::DistributionDefault => {
            let client = registry_client(args.docker_configs)?;
            let resolver =
                BaseConfigResolver::new(resolver_config(args.image_overrides)?, DigestCache::new())
                    .with_source(Arc::new(client));
            let generation: Generation = if source == ConfigSource::Generated {
                generate_detailed(&spec, &resolver).await?
            } else {
                distribution_default(&spec, &resolver).await?
            };
            let refs = generation.secrets.secret_references();
            (
                generation.artifact,
                Some(generation.image),
                refs,
                generation.warnings,
            )
        }
    };

    let summary = GenerateSummary {
        source,
        object_name: config_object_name(args.instance, &artifact.content_hash),
        content_hash: artifact.content_hash.clone(),
        image,
        provider_count: artifact.provider_count,
        resource_count: artifact.resource_count,
        schema_version: artifact.schema_version,
        env_vars: artifact.env_vars.clone(),
        secret_references,
        warnings,
    };

    match args.output {
        Some(path) => {
            std::fs::write(path, &artifact.document)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => {
            print!("{}", artifact.document);
            eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

fn cmd_distributions(image_overrides: Option<&Path>) -> Result<()> {
    let config = resolver_config(image_overrides)?;
    let embedded = embedded_distribution_names();
    for name in config.known_names() {
        let image = config.image_for(&name).unwrap_or_default();
        let marker = if embedded.contains(&name.as_str()) {
            "embedded"
        } else {
            "registry"
        };
        println!("{:<24} {:<10} {}", name, marker, image);
    }
    Ok(())
}

async fn cmd_inspect_image(reference: &str, docker_configs: &[PathBuf]) -> Result<()> {
    let parsed = ImageReference::parse(reference)?;
    let client = registry_client(docker_configs)?;

    let digest = client
        .resolve_digest(&parsed)
        .await
        .with_context(|| format!("Failed to resolve {}", reference))?;
    let extracted = ImageConfigSource::extract_config(&client, &parsed.with_digest(&digest))
        .await
        .with_context(|| format!("Failed to extract config from {}", reference))?;

    eprintln!("image:   {}", parsed.with_digest(&digest).pinned());
    eprintln!("origin:  {}", serde_json::to_string(&extracted.origin)?);
    if let Some(version) = &extracted.declared_version {
        eprintln!("version: {}", version);
    }
    print!("{}", extracted.document);
    Ok(())
}

fn cmd_check_version(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let config = BaseConfig::from_yaml(&text)?;
    validate_version(config.version)?;
    println!(
        "{}: version {} is supported ({:?})",
        file.display(),
        config.version,
        supported_versions()
    );
    Ok(())
}
