//! Typed configuration produced by the layer merge

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::ConfigError;
use crate::collect::CollectionRule;
use crate::phase::ArtifactPhase;
use crate::scan::ScanFilter;

/// Upper bound accepted for `retention_days`
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Artifact compression setting.
///
/// Accepted and recorded in reports; the store itself is never compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Parse an environment value (`true`/`gzip` enable, `false`/`none`/empty disable)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "none" | "0" | "off" => Some(Compression::None),
            "true" | "gzip" | "1" | "on" => Some(Compression::Gzip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact encryption setting.
///
/// Accepted and recorded in reports; artifacts are stored in the clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    None,
    Aes256,
}

impl Encryption {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "none" | "0" | "off" => Some(Encryption::None),
            "true" | "aes256" | "aes-256" | "1" | "on" => Some(Encryption::Aes256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encryption::None => "none",
            Encryption::Aes256 => "aes256",
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline identity recorded in run metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub branch: String,
    pub commit_id: String,
    pub build_id: String,
    pub environment: String,
}

/// Effective artifact manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Files older than this many days are removed by `cleanup` (0 = keep forever)
    pub retention_days: u32,

    pub compression: Compression,

    pub encryption: Encryption,

    /// Whether `test:artifacts` runs the validation step
    pub validation: bool,

    /// Maximum wait for the metadata lock
    pub lock_timeout_seconds: u64,

    #[serde(default)]
    pub verbose: bool,

    /// Collector and cleanup perform no writes
    #[serde(default)]
    pub dry_run: bool,

    pub run: RunIdentity,

    /// Collection rules keyed by source name
    pub sources: BTreeMap<String, CollectionRule>,
}

impl ArtifactConfig {
    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Validation(format!(
                "retention_days must be at most {}, got {}",
                MAX_RETENTION_DAYS, self.retention_days
            )));
        }

        if self.lock_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "lock_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        for (name, rule) in &self.sources {
            rule.validate()
                .map_err(|reason| ConfigError::Validation(format!("source '{}': {}", name, reason)))?;
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    /// Look up a collection rule by source name
    pub fn rule(&self, name: &str) -> Option<&CollectionRule> {
        self.sources.get(name)
    }

    /// Extension filter used to enumerate a phase tree at finalize/report time.
    ///
    /// Union of every rule targeting the phase plus `.json`, which covers
    /// documents other components write into the tree (scan results, reports).
    pub fn phase_filter(&self, phase: ArtifactPhase) -> ScanFilter {
        let base = match phase {
            ArtifactPhase::Metadata => ScanFilter::new(&[".json", ".md"]),
            _ => ScanFilter::new(&[".json"]),
        };

        self.sources
            .values()
            .filter(|r| r.phase == phase)
            .fold(base, |acc, rule| {
                acc.union(&ScanFilter::new(&rule.extensions))
            })
    }
}
