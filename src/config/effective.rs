//! Effective configuration with provenance
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Project config file (`artifacts.toml` or `--config`)
//! 3. Environment variables
//! 4. CLI flags

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::builtin_value;
use super::merge::merge_layers;
use super::settings::{ArtifactConfig, Compression, Encryption};
use super::ConfigError;

/// Project config file looked up under the project root
pub const PROJECT_CONFIG_FILE: &str = "artifacts.toml";

/// Environment variables read into the configuration
pub const ENV_RETENTION_DAYS: &str = "ARTIFACT_RETENTION_DAYS";
pub const ENV_COMPRESSION: &str = "ARTIFACT_COMPRESSION";
pub const ENV_ENCRYPTION: &str = "ARTIFACT_ENCRYPTION";
pub const ENV_VALIDATION: &str = "ARTIFACT_VALIDATION";
pub const ENV_BRANCH: &str = "AWS_BRANCH";
pub const ENV_COMMIT_ID: &str = "AWS_COMMIT_ID";
pub const ENV_BUILD_ID: &str = "AWS_BUILD_ID";
pub const ENV_ENVIRONMENT: &str = "NODE_ENV";

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Variables that contributed (env layer only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

/// Merged configuration plus the layers it came from
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: ArtifactConfig,
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build from the process environment.
    ///
    /// `config_path` is required to exist when given; otherwise
    /// `<project_root>/artifacts.toml` is used if present.
    pub fn load(
        project_root: &Path,
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        Self::build(project_root, config_path, |name| std::env::var(name).ok(), cli_overrides)
    }

    /// Build with an explicit environment lookup
    pub fn build<F>(
        project_root: &Path,
        config_path: Option<&Path>,
        env: F,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers = vec![builtin_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
            variables: Vec::new(),
        }];

        let file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = project_root.join(PROJECT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        if let Some(path) = file {
            let (value, digest) = load_toml_file(&path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
                variables: Vec::new(),
            });
        }

        let (env_value, variables) = env_layer(env)?;
        if !variables.is_empty() {
            layers.push(env_value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Env,
                path: None,
                digest: None,
                variables,
            });
        }

        let cli_overrides =
            cli_overrides.filter(|v| v.as_object().map_or(true, |o| !o.is_empty()));
        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
                variables: Vec::new(),
            });
        }

        let merged = merge_layers(layers);
        let config: ArtifactConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;

        Ok(Self { config, sources })
    }
}

/// Load a TOML file as a JSON value, returning it with the file digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::Parse(format!("{}: invalid UTF-8: {}", path.display(), e)))?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

    Ok((toml_to_json(toml_value), digest))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Translate recognised environment variables into a config layer.
///
/// Returns the layer and the names of the variables that were set.
fn env_layer<F>(env: F) -> Result<(Value, Vec<String>), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut root = Map::new();
    let mut run = Map::new();
    let mut used = Vec::new();

    if let Some(raw) = env(ENV_RETENTION_DAYS) {
        let days: u32 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: ENV_RETENTION_DAYS.to_string(),
            value: raw.clone(),
            expected: "a non-negative integer number of days",
        })?;
        root.insert("retention_days".to_string(), Value::from(days));
        used.push(ENV_RETENTION_DAYS.to_string());
    }

    if let Some(raw) = env(ENV_COMPRESSION) {
        let compression = Compression::parse(&raw).ok_or_else(|| ConfigError::InvalidEnv {
            var: ENV_COMPRESSION.to_string(),
            value: raw.clone(),
            expected: "true, false, none or gzip",
        })?;
        root.insert("compression".to_string(), Value::from(compression.as_str()));
        used.push(ENV_COMPRESSION.to_string());
    }

    if let Some(raw) = env(ENV_ENCRYPTION) {
        let encryption = Encryption::parse(&raw).ok_or_else(|| ConfigError::InvalidEnv {
            var: ENV_ENCRYPTION.to_string(),
            value: raw.clone(),
            expected: "true, false, none or aes256",
        })?;
        root.insert("encryption".to_string(), Value::from(encryption.as_str()));
        used.push(ENV_ENCRYPTION.to_string());
    }

    if let Some(raw) = env(ENV_VALIDATION) {
        let enabled = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidEnv {
            var: ENV_VALIDATION.to_string(),
            value: raw.clone(),
            expected: "true or false",
        })?;
        root.insert("validation".to_string(), Value::Bool(enabled));
        used.push(ENV_VALIDATION.to_string());
    }

    for (var, key) in [
        (ENV_BRANCH, "branch"),
        (ENV_COMMIT_ID, "commit_id"),
        (ENV_BUILD_ID, "build_id"),
        (ENV_ENVIRONMENT, "environment"),
    ] {
        if let Some(value) = env(var).filter(|v| !v.trim().is_empty()) {
            run.insert(key.to_string(), Value::String(value));
            used.push(var.to_string());
        }
    }

    if !run.is_empty() {
        root.insert("run".to_string(), Value::Object(run));
    }

    Ok((Value::Object(root), used))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
