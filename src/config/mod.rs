//! Configuration layering
//!
//! Built-in defaults, the project `artifacts.toml`, environment variables and
//! CLI flags are merged into one [`ArtifactConfig`].

mod defaults;
mod effective;
mod merge;
mod settings;

use std::path::PathBuf;

pub use defaults::{builtin_value, DEFAULT_EXCLUDE_DIRS};
pub use effective::{
    ConfigOrigin, ConfigSource, EffectiveConfig, ENV_BRANCH, ENV_BUILD_ID,
    ENV_COMMIT_ID, ENV_COMPRESSION, ENV_ENCRYPTION, ENV_ENVIRONMENT, ENV_RETENTION_DAYS,
    ENV_VALIDATION, PROJECT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{ArtifactConfig, Compression, Encryption, RunIdentity, MAX_RETENTION_DAYS};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for {var}: expected {expected}")]
    InvalidEnv {
        var: String,
        value: String,
        expected: &'static str,
    },

    #[error("config validation error: {0}")]
    Validation(String),
}

impl ArtifactConfig {
    /// Built-in defaults with no file, environment or CLI layers
    pub fn builtin() -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(builtin_value())
            .map_err(|e| ConfigError::Parse(format!("built-in defaults: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
