//! Detection policy: the ordered pattern list plus file selection limits.
//!
//! The policy is plain data so it can be persisted next to the artifacts
//! (`.security-config.json`) and edited without rebuilding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default upper bound on the size of a file the scanner will read (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions treated as text-like artifacts (scripts, config, markup, logs).
pub const DEFAULT_TEXT_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".json", ".yml", ".yaml", ".env", ".xml", ".html", ".txt", ".log", ".md",
    ".sh", ".config",
];

/// Severity attached to a pattern and copied onto every violation it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named detection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Stable rule name (e.g. "password-assignment")
    pub name: String,

    /// Regular expression source (regex-lite syntax)
    pub pattern: String,

    /// Severity reported for matches
    pub severity: Severity,
}

impl PatternSpec {
    pub fn new(name: &str, pattern: &str, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            severity,
        }
    }
}

/// Full scanner policy as persisted in `.security-config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    /// Ordered detection rules
    pub patterns: Vec<PatternSpec>,

    /// Extensions (with leading dot) of files the scanner reads
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,

    /// Files larger than this are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

fn default_text_extensions() -> Vec<String> {
    DEFAULT_TEXT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            text_extensions: default_text_extensions(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

impl SecurityPolicy {
    /// Whether a file with this extension (leading dot included) is scanned.
    pub fn is_text_extension(&self, extension: &str) -> bool {
        self.text_extensions.iter().any(|e| e == extension)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Built-in rules: assignment-style credentials and PEM blocks.
pub fn default_patterns() -> Vec<PatternSpec> {
    vec![
        PatternSpec::new(
            "password-assignment",
            r#"(?i)password\s*=\s*["']?[^\s"']+["']?"#,
            Severity::High,
        ),
        PatternSpec::new(
            "secret-assignment",
            r#"(?i)secret\s*=\s*["']?[^\s"']+["']?"#,
            Severity::High,
        ),
        PatternSpec::new(
            "api-key-assignment",
            r#"(?i)api[_-]key\s*=\s*["']?[^\s"']+["']?"#,
            Severity::High,
        ),
        PatternSpec::new(
            "token-assignment",
            r#"(?i)token\s*=\s*["']?[^\s"']+["']?"#,
            Severity::High,
        ),
        PatternSpec::new(
            "pem-block",
            r"-----BEGIN [A-Z ]+-----[\s\S]*?-----END [A-Z ]+-----",
            Severity::High,
        ),
    ]
}
