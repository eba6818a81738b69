//! Storage expansion: abstract kv/sql intent onto concrete store fragments.

use crate::domain::error::{ConfigError, Result};
use crate::domain::{BaseConfig, KvStorageSpec, SqlStorageSpec, StorageSpec};
use crate::secrets::{SecretResolution, KV_OWNER, KV_PASSWORD_FIELD, SQL_CONNECTION_FIELD, SQL_OWNER};
use serde_json::{Map, Value};

pub const SQLITE: &str = "sqlite";
pub const REDIS: &str = "redis";
pub const POSTGRES: &str = "postgres";

/// Store fragment the key-value choice applies to.
pub const KV_STORE_KEY: &str = "metadata_store";

/// Relational store fragments; one sql choice applies to all of them.
pub const SQL_STORE_KEYS: [&str; 9] = [
    "inference_store",
    "safety_store",
    "vector_io_store",
    "tool_runtime_store",
    "telemetry_store",
    "post_training_store",
    "scoring_store",
    "eval_store",
    "datasetio_store",
];

const SQLITE_KV_PATH: &str = "${env.SQLITE_STORE_DIR:=~/.llama}/kvstore.db";
const SQLITE_SQL_PATH: &str = "${env.SQLITE_STORE_DIR:=~/.llama}/sqlstore.db";

fn kind_or_default(kind: Option<&str>) -> &str {
    kind.filter(|k| !k.is_empty()).unwrap_or(SQLITE)
}

/// Fragment for a key-value store choice.
pub fn kv_fragment(kv: &KvStorageSpec, secrets: &SecretResolution) -> Result<Map<String, Value>> {
    let kind = kind_or_default(kv.kind.as_deref());
    let mut out = Map::new();
    out.insert("type".into(), Value::String(kind.to_string()));

    match kind {
        SQLITE => {
            out.insert("db_path".into(), Value::String(SQLITE_KV_PATH.to_string()));
        }
        REDIS => {
            let endpoint = kv
                .endpoint
                .as_deref()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| ConfigError::malformed("storage.kv.endpoint", "required for redis"))?;
            out.insert("host".into(), Value::String(endpoint.to_string()));
            if kv.password.as_ref().is_some_and(|v| !v.is_null()) {
                out.insert(
                    "password".into(),
                    Value::String(secrets.substitution_or_derived(KV_OWNER, KV_PASSWORD_FIELD)),
                );
            }
        }
        other => {
            return Err(ConfigError::malformed(
                "storage.kv.type",
                format!("unsupported type {:?}; expected one of [{}, {}]", other, SQLITE, REDIS),
            ))
        }
    }
    Ok(out)
}

/// Fragment for a relational store choice.
pub fn sql_fragment(sql: &SqlStorageSpec, secrets: &SecretResolution) -> Result<Map<String, Value>> {
    let kind = kind_or_default(sql.kind.as_deref());
    let mut out = Map::new();
    out.insert("type".into(), Value::String(kind.to_string()));

    match kind {
        SQLITE => {
            out.insert("db_path".into(), Value::String(SQLITE_SQL_PATH.to_string()));
        }
        POSTGRES => {
            if !sql.connection_string.as_ref().is_some_and(|v| !v.is_null()) {
                return Err(ConfigError::malformed(
                    "storage.sql.connectionString",
                    "required for postgres",
                ));
            }
            out.insert(
                "connection_string".into(),
                Value::String(secrets.substitution_or_derived(SQL_OWNER, SQL_CONNECTION_FIELD)),
            );
        }
        other => {
            return Err(ConfigError::malformed(
                "storage.sql.type",
                format!("unsupported type {:?}; expected one of [{}, {}]", other, SQLITE, POSTGRES),
            ))
        }
    }
    Ok(out)
}

/// Overlay `fragment` on an existing store; fragment keys win, other keys
/// of the existing store are kept.
fn merge_store(existing: Option<&Map<String, Value>>, fragment: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = existing.cloned().unwrap_or_default();
    for (k, v) in fragment {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Apply storage intent to a copy of `base`. `None` returns the copy unchanged.
pub fn expand_storage(
    spec: Option<&StorageSpec>,
    base: &BaseConfig,
    secrets: &SecretResolution,
) -> Result<BaseConfig> {
    let mut out = base.clone();
    let Some(spec) = spec else {
        return Ok(out);
    };

    if let Some(kv) = &spec.kv {
        let fragment = kv_fragment(kv, secrets)?;
        let merged = merge_store(out.stores.get(KV_STORE_KEY), &fragment);
        out.stores.insert(KV_STORE_KEY.to_string(), merged);
    }

    if let Some(sql) = &spec.sql {
        let fragment = sql_fragment(sql, secrets)?;
        for key in SQL_STORE_KEYS {
            let merged = merge_store(out.stores.get(key), &fragment);
            out.stores.insert(key.to_string(), merged);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> BaseConfig {
        BaseConfig::from_yaml(
            r#"
version: 2
metadata_store:
  type: sqlite
  db_path: /data/kv.db
  namespace: llama
inference_store:
  type: sqlite
  db_path: /data/inference.db
eval_store:
  type: sqlite
  db_path: /data/eval.db
"#,
        )
        .unwrap()
    }

    fn storage(v: Value) -> StorageSpec {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_no_storage_leaves_base_untouched() {
        let b = base();
        let out = expand_storage(None, &b, &SecretResolution::new()).unwrap();
        assert_eq!(out, b);
    }

    #[test]
    fn test_redis_overlays_sqlite_metadata_store() {
        let spec = storage(json!({"kv": {"type": "redis", "endpoint": "redis:6379", "password": {"name": "r", "key": "pw"}}}));
        let out = expand_storage(Some(&spec), &base(), &SecretResolution::new()).unwrap();
        let kv = &out.stores[KV_STORE_KEY];
        assert_eq!(kv["type"], "redis");
        assert_eq!(kv["host"], "redis:6379");
        assert_eq!(kv["password"], "${env.LLSD_KV_REDIS_PASSWORD}");
        assert_eq!(kv["namespace"], "llama");
        // sql fragments untouched
        assert_eq!(out.stores["inference_store"], base().stores["inference_store"]);
    }

    #[test]
    fn test_same_kind_merges_keys() {
        let spec = storage(json!({"kv": {"type": "sqlite"}}));
        let out = expand_storage(Some(&spec), &base(), &SecretResolution::new()).unwrap();
        let kv = &out.stores[KV_STORE_KEY];
        assert_eq!(kv["db_path"], SQLITE_KV_PATH);
        assert_eq!(kv["namespace"], "llama");
    }

    #[test]
    fn test_postgres_applies_to_every_sql_store() {
        let spec = storage(json!({"sql": {"type": "postgres", "connectionString": {"name": "pg", "key": "dsn"}}}));
        let out = expand_storage(Some(&spec), &base(), &SecretResolution::new()).unwrap();
        for key in SQL_STORE_KEYS {
            assert_eq!(out.stores[key]["type"], "postgres", "{}", key);
            assert_eq!(
                out.stores[key]["connection_string"],
                "${env.LLSD_SQL_POSTGRES_CONNECTIONSTRING}"
            );
        }
        // present stores keep their other keys
        assert_eq!(out.stores["eval_store"]["db_path"], "/data/eval.db");
        assert_eq!(out.stores[KV_STORE_KEY], base().stores[KV_STORE_KEY]);
    }

    #[test]
    fn test_sql_choice_creates_stores_missing_from_base() {
        let base = BaseConfig::from_yaml(
            "version: 2\nmetadata_store: {type: sqlite, db_path: /data/kv.db}\ninference_store: {type: sqlite, db_path: /data/inference.db}\n",
        )
        .unwrap();
        let spec = storage(json!({"sql": {"type": "postgres", "connectionString": {"name": "pg", "key": "dsn"}}}));
        let out = expand_storage(Some(&spec), &base, &SecretResolution::new()).unwrap();

        let eval = &out.stores["eval_store"];
        assert_eq!(eval.len(), 2);
        assert_eq!(eval["type"], "postgres");
        assert!(out.stores.contains_key("safety_store"));
        assert_eq!(out.stores["inference_store"]["db_path"], "/data/inference.db");
    }

    #[test]
    fn test_redis_without_endpoint_is_malformed() {
        let spec = storage(json!({"kv": {"type": "redis"}}));
        let err = expand_storage(Some(&spec), &base(), &SecretResolution::new()).unwrap_err();
        assert!(err.to_string().starts_with("storage.kv.endpoint"));
    }

    #[test]
    fn test_unknown_sql_type_rejected() {
        let spec = storage(json!({"sql": {"type": "mysql"}}));
        assert!(expand_storage(Some(&spec), &base(), &SecretResolution::new()).is_err());
    }
}
