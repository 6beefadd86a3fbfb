use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::RagConfig;
use super::validation::validate_config;
use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Float,
    Integer,
}

/// Environment variables layered over the YAML files, most specific last.
const ENV_OVERRIDES: [(&str, &[&str], EnvKind); 9] = [
    ("OPENAI_API_KEY", &["gateway", "api_key"], EnvKind::Text),
    ("OPENAI_BASE_URL", &["gateway", "base_url"], EnvKind::Text),
    ("EMBEDDING_MODEL", &["gateway", "embedding_model"], EnvKind::Text),
    ("LLM_MODEL_NAME", &["gateway", "completion_model"], EnvKind::Text),
    ("LLM_TEMPERATURE", &["gateway", "temperature"], EnvKind::Float),
    ("RETRIEVAL_K", &["index", "retrieval_k"], EnvKind::Integer),
    ("VECTOR_PERSIST_DIR", &["index", "persist_dir"], EnvKind::Text),
    ("MAX_HISTORY_TURNS", &["pipeline", "max_history_turns"], EnvKind::Integer),
    ("PORT", &["server", "port"], EnvKind::Integer),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("JIVANU_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// `config.yml` deep-merged with `secrets.yaml`.
    pub fn load_raw(&self) -> Value {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        deep_merge(&public_config, &secrets_config)
    }

    /// Builds the validated runtime configuration from files and environment.
    pub fn load_config(&self) -> Result<RagConfig, RagError> {
        let mut raw = self.load_raw();
        apply_env_overrides(&mut raw, |key| env::var(key).ok())?;
        let config: RagConfig = serde_json::from_value(raw)
            .map_err(|e| RagError::Config(format!("config.yml: {}", e)))?;
        validate_config(&config)?;
        Ok(config)
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Ignoring unparsable config file {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F) -> Result<(), RagError>
where
    F: Fn(&str) -> Option<String>,
{
    for (var, path, kind) in ENV_OVERRIDES {
        let Some(raw) = lookup(var) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let value = match kind {
            EnvKind::Text => Value::String(raw.to_string()),
            EnvKind::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| RagError::Config(format!("{} must be a number", var)))?,
            EnvKind::Integer => raw
                .parse::<u64>()
                .map(|v| Value::Number(v.into()))
                .map_err(|_| RagError::Config(format!("{} must be a non-negative integer", var)))?,
        };
        ensure_object_path(config, path, value);
    }
    Ok(())
}

fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}
