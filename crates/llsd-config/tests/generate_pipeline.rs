//! End-to-end tests for config generation over an in-memory registry.

use llsd_config::{
    config_object_name, distribution_default, generate, generate_detailed, BaseConfigResolver,
    BaseOrigin, ConfigError, DigestCache, DistributionSpec, ResolverConfig,
};
use llsd_registry::fakes::StaticConfigSource;
use llsd_registry::RegistryError;
use serde_json::{json, Value};
use std::sync::Arc;

const IMAGE: &str = "quay.io/acme/vllm-dist:1";
const DIGEST_A: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const DIGEST_B: &str = "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

const BASE_DOC: &str = r#"
version: 2
image_name: vllm-dist
apis:
- inference
- safety
- tool_runtime
providers:
  inference:
  - provider_id: vllm
    provider_type: remote::vllm
    config:
      url: http://localhost:8000
  safety:
  - provider_id: llama-guard
    provider_type: inline::llama-guard
  tool_runtime:
  - provider_id: rag-runtime
    provider_type: inline::rag-runtime
metadata_store:
  type: sqlite
  db_path: /data/registry.db
inference_store:
  type: sqlite
  db_path: /data/inference.db
server:
  port: 8321
"#;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn source() -> Arc<StaticConfigSource> {
    Arc::new(
        StaticConfigSource::new()
            .with_image(IMAGE, DIGEST_A, BASE_DOC)
            .unwrap(),
    )
}

fn resolver(source: Arc<StaticConfigSource>) -> BaseConfigResolver {
    BaseConfigResolver::new(ResolverConfig::default(), DigestCache::new()).with_source(source)
}

fn spec(extra: &str) -> DistributionSpec {
    DistributionSpec::from_yaml(&format!("distribution:\n  image: {}\n{}", IMAGE, extra)).unwrap()
}

fn parse(document: &str) -> Value {
    serde_yaml::from_str(document).unwrap()
}

// ---------------------------------------------------------------------------
// Example scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_provider_and_model_scenario() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
providers:
  inference:
    type: vllm
    endpoint: http://vllm:8000
resources:
  models:
  - llama3.2-8b
"#,
    );

    let (artifact, image) = generate(&spec, &resolver).await.unwrap();
    assert_eq!(image, IMAGE);

    let doc = parse(&artifact.document);
    let inference = doc["providers"]["inference"].as_array().unwrap();
    assert_eq!(inference.len(), 1);
    assert_eq!(inference[0]["provider_id"], "vllm");
    assert_eq!(inference[0]["provider_type"], "remote::vllm");
    assert_eq!(inference[0]["config"]["url"], "http://vllm:8000");
    assert_eq!(
        doc["models"],
        json!([{"model_id": "llama3.2-8b", "provider_id": "vllm"}])
    );
    assert_eq!(artifact.provider_count, 1);
    assert_eq!(artifact.resource_count, 1);
    assert_eq!(artifact.schema_version, 2);

    let (again, _) = generate(&spec, &resolver).await.unwrap();
    assert_eq!(again.document, artifact.document);
    assert_eq!(again.content_hash, artifact.content_hash);
}

#[tokio::test]
async fn test_derived_id_collision_in_list_fails() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
providers:
  inference:
  - id: a
    type: x
  - type: a
"#,
    );

    match generate(&spec, &resolver).await.unwrap_err() {
        ConfigError::DuplicateProviderId { id, first, second } => {
            assert_eq!(id, "a");
            assert_eq!(first, "providers.inference[0]");
            assert_eq!(second, "providers.inference[1]");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_duplicate_id_across_capabilities_fails() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
providers:
  inference: {id: shared, provider: vllm}
  toolRuntime: {id: shared, provider: brave-search}
"#,
    );

    let err = generate(&spec, &resolver).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("providers.inference[0]"), "{msg}");
    assert!(msg.contains("providers.toolRuntime[0]"), "{msg}");
}

#[tokio::test]
async fn test_list_without_ids_fails() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
providers:
  inference:
  - provider: vllm
  - provider: ollama
"#,
    );
    let err = generate(&spec, &resolver).await.unwrap_err();
    assert!(matches!(err, ConfigError::MissingProviderId { .. }));
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_secret_references_never_reach_the_document() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
providers:
  inference:
  - id: openai-a
    provider: openai
    apiKey: {name: openai-creds, key: token}
  - id: openai-b
    provider: openai
    apiKey: {secretKeyRef: {name: openai-creds, key: token}}
    settings:
      organization: {name: openai-org, key: org-id}
storage:
  sql:
    type: postgres
    connectionString: {name: pg-creds, key: dsn}
"#,
    );

    let generation = generate_detailed(&spec, &resolver).await.unwrap();
    let document = &generation.artifact.document;

    for secret in ["openai-creds", "openai-org", "pg-creds", "org-id", "dsn"] {
        assert!(!document.contains(secret), "{secret} leaked into document");
    }
    assert!(document.contains("${env.LLSD_OPENAI_A_APIKEY}"));
    assert!(document.contains("${env.LLSD_OPENAI_B_ORGANIZATION}"));
    assert!(document.contains("${env.LLSD_SQL_POSTGRES_CONNECTIONSTRING}"));
    // the base has no eval_store; the sql choice still reaches it
    let doc = parse(document);
    assert_eq!(doc["eval_store"]["type"], "postgres");

    let names: Vec<&str> = generation
        .artifact
        .env_vars
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "LLSD_OPENAI_A_APIKEY",
            "LLSD_OPENAI_B_APIKEY",
            "LLSD_OPENAI_B_ORGANIZATION",
            "LLSD_SQL_POSTGRES_CONNECTIONSTRING",
        ]
    );
    // two tokens share one secret key
    assert_eq!(generation.secrets.secret_references().len(), 3);
}

// ---------------------------------------------------------------------------
// Disabled capabilities and storage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_disabling_absent_capability_is_a_no_op() {
    let resolver = resolver(source());
    let baseline = distribution_default(&spec(""), &resolver).await.unwrap();
    let (artifact, _) = generate(&spec("disabled: [post_training]\n"), &resolver)
        .await
        .unwrap();
    assert_eq!(artifact.document, baseline.artifact.document);
    assert_eq!(artifact.content_hash, baseline.artifact.content_hash);
}

#[tokio::test]
async fn test_disabling_base_capability_removes_it() {
    let resolver = resolver(source());
    let (artifact, _) = generate(&spec("disabled: [safety]\n"), &resolver)
        .await
        .unwrap();
    let doc = parse(&artifact.document);
    assert_eq!(doc["apis"], json!(["inference", "tool_runtime"]));
    assert!(doc["providers"].get("safety").is_none());
    assert!(doc["providers"].get("inference").is_some());
}

#[tokio::test]
async fn test_unspecified_storage_keeps_base_stores() {
    let resolver = resolver(source());
    let (artifact, _) = generate(&spec("providers:\n  inference: {provider: ollama}\n"), &resolver)
        .await
        .unwrap();
    let doc = parse(&artifact.document);
    let base = parse(BASE_DOC);
    assert_eq!(doc["metadata_store"], base["metadata_store"]);
    assert_eq!(doc["inference_store"], base["inference_store"]);
    assert_eq!(doc["server"], base["server"]);
    assert_eq!(doc["image_name"], "vllm-dist");
}

#[tokio::test]
async fn test_tools_bind_to_base_tool_runtime() {
    let resolver = resolver(source());
    let (artifact, _) = generate(
        &spec("resources:\n  tools: [builtin::rag]\n  shields: [llama-guard-3]\n"),
        &resolver,
    )
    .await
    .unwrap();
    let doc = parse(&artifact.document);
    assert_eq!(
        doc["tool_groups"],
        json!([{"toolgroup_id": "builtin::rag", "provider_id": "rag-runtime"}])
    );
    assert_eq!(doc["shields"][0]["provider_id"], "llama-guard");
    assert_eq!(artifact.resource_count, 2);
    // no user providers: the base count is reported
    assert_eq!(artifact.provider_count, 3);
}

// ---------------------------------------------------------------------------
// Base resolution and caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cache_is_keyed_by_digest() {
    let source = source();
    let resolver = resolver(source.clone());
    let spec = spec("disabled: [safety]\n");

    let first = generate_detailed(&spec, &resolver).await.unwrap();
    let second = generate_detailed(&spec, &resolver).await.unwrap();
    assert_eq!(source.extraction_count(), 1);
    assert!(matches!(first.origin, BaseOrigin::Registry { .. }));
    assert_eq!(second.origin, BaseOrigin::Cached { digest: DIGEST_A.to_string() });
    assert_eq!(first.artifact.content_hash, second.artifact.content_hash);

    // the tag moves: the new digest misses the cache
    source.put_document(DIGEST_B, &BASE_DOC.replace("/data/", "/var/lib/llama/"));
    source.point_tag(IMAGE, DIGEST_B).unwrap();
    let moved = generate_detailed(&spec, &resolver).await.unwrap();
    assert_eq!(source.extraction_count(), 2);
    assert_eq!(resolver.cache().len(), 2);
    assert_ne!(moved.artifact.content_hash, first.artifact.content_hash);
}

#[tokio::test]
async fn test_seeded_cache_skips_extraction() {
    let source = source();
    let seeded = DigestCache::seeded(vec![(
        DIGEST_A.to_string(),
        llsd_config::BaseConfig::from_yaml(BASE_DOC).unwrap(),
    )]);
    let resolver =
        BaseConfigResolver::new(ResolverConfig::default(), seeded).with_source(source.clone());
    generate(&spec("disabled: [safety]\n"), &resolver).await.unwrap();
    assert_eq!(source.extraction_count(), 0);
}

#[tokio::test]
async fn test_named_distribution_through_registry() {
    let image = "docker.io/llamastack/distribution-meta-reference-gpu:latest";
    let source = Arc::new(
        StaticConfigSource::new()
            .with_image(image, DIGEST_A, BASE_DOC)
            .unwrap(),
    );
    let resolver = BaseConfigResolver::new(ResolverConfig::new().unwrap(), DigestCache::new())
        .with_source(source.clone());
    let spec = DistributionSpec::from_yaml(
        "distribution: {name: meta-reference-gpu}\ndisabled: [safety]\n",
    )
    .unwrap();

    let (_, resolved_image) = generate(&spec, &resolver).await.unwrap();
    assert_eq!(resolved_image, image);
    assert_eq!(source.extraction_count(), 1);
}

#[tokio::test]
async fn test_embedded_distribution_needs_no_registry() {
    let resolver = BaseConfigResolver::new(ResolverConfig::new().unwrap(), DigestCache::new());
    let spec = DistributionSpec::from_yaml(
        r#"
distribution: {name: remote-vllm}
providers:
  inference: {provider: vllm, endpoint: "http://vllm.models.svc:8000/v1"}
resources:
  models: [meta-llama/Llama-3.2-3B-Instruct]
"#,
    )
    .unwrap();

    let (artifact, image) = generate(&spec, &resolver).await.unwrap();
    assert_eq!(image, "docker.io/llamastack/distribution-remote-vllm:latest");
    let doc = parse(&artifact.document);
    assert_eq!(doc["providers"]["inference"][0]["provider_id"], "vllm");
    assert_eq!(doc["models"][0]["provider_id"], "vllm");
    assert_eq!(
        config_object_name("llama", &artifact.content_hash),
        format!("llama-config-{}", &artifact.content_hash[..8])
    );
}

#[tokio::test]
async fn test_unsupported_base_version_is_rejected() {
    let source = Arc::new(
        StaticConfigSource::new()
            .with_image(IMAGE, DIGEST_A, "version: 3\napis: []\n")
            .unwrap(),
    );
    let err = generate(&spec("disabled: [safety]\n"), &resolver(source))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "config version 3 is not supported; supported versions: [1, 2]"
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unlabelled_image_points_at_override() {
    let source = Arc::new(
        StaticConfigSource::new()
            .with_unlabelled_image(IMAGE, DIGEST_A)
            .unwrap(),
    );
    let err = generate(&spec("disabled: [safety]\n"), &resolver(source))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Registry(RegistryError::MissingConfigLabels { .. })
    ));
    assert!(err.to_string().contains("overrideConfig"));
    assert!(!err.is_retryable());
}

// ---------------------------------------------------------------------------
// External providers and env var naming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_external_provider_replaces_inline_and_warns() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
externalProviders:
  inference:
  - provider_id: vllm
    provider_type: remote::vllm-custom
    module: acme_vllm
  safety:
  - provider_id: acme-guard
    provider_type: remote::acme-guard
disabled: [safety]
"#,
    );

    let generation = generate_detailed(&spec, &resolver).await.unwrap();
    let doc = parse(&generation.artifact.document);

    let inference = doc["providers"]["inference"].as_array().unwrap();
    assert_eq!(inference.len(), 1);
    assert_eq!(inference[0]["provider_type"], "remote::vllm-custom");
    assert_eq!(inference[0]["module"], "acme_vllm");
    // disabled capabilities stay removed even when external entries name them
    assert!(doc["providers"].get("safety").is_none());

    assert_eq!(generation.warnings.len(), 1);
    assert!(generation.warnings[0].contains("\"vllm\""));
}

#[tokio::test]
async fn test_secret_tokens_folding_to_one_env_var_fail_generation() {
    let resolver = resolver(source());
    let spec = spec(
        r#"
providers:
  inference:
  - id: a-b
    provider: vllm
    settings:
      c: {name: secret-one, key: k1}
  - id: a
    provider: ollama
    settings:
      b-c: {name: secret-two, key: k2}
"#,
    );

    let err = generate(&spec, &resolver).await.unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarCollision { .. }));
    assert!(err.to_string().contains("LLSD_A_B_C"));
}
