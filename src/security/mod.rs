//! Secret scan over the artifact store
//!
//! Walks `artifacts/` for text-like files and applies the pattern policy
//! from `.security-config.json`. Findings are data: a scan with violations
//! still succeeds. The scanner skips its own output directory and the audit
//! log directory, so persisting a result never feeds the next scan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use artifact_secrets::{Detector, PatternError, SecurityPolicy, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::{
    relative_key, ArtifactLayout, AUDIT_LOG_DIR, SECURITY_CONFIG_FILE, SECURITY_SCAN_DIR,
};
use crate::scan::{scan, ScanError, ScanFilter};

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("malformed security policy {path}: {source}")]
    Policy {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed scan result {path}: {source}")]
    ResultFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("security scan I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One rule matching one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path relative to the scanned root
    pub file: String,
    pub rule: String,
    pub pattern: String,
    pub matches: usize,
    pub severity: Severity,
}

/// Persisted result of one scan pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScanResult {
    pub scanned_files: usize,
    #[serde(default)]
    pub skipped_files: usize,
    pub sensitive_data_found: bool,
    pub violations: Vec<Violation>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityScanResult {
    /// Highest severity among violations
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

/// Policy from `.security-config.json`, or the built-in one when absent.
pub fn load_policy(layout: &ArtifactLayout) -> Result<SecurityPolicy, SecurityError> {
    let path = layout.security_config_path();
    let json = match fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "security config not found, using built-in patterns");
            return Ok(SecurityPolicy::default());
        }
        Err(source) => return Err(SecurityError::Io { path, source }),
    };

    SecurityPolicy::from_json(&json).map_err(|source| SecurityError::Policy { path, source })
}

pub fn write_policy(layout: &ArtifactLayout, policy: &SecurityPolicy) -> Result<(), SecurityError> {
    let path = layout.security_config_path();
    let json = policy.to_json().map_err(|source| SecurityError::Policy {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| SecurityError::Io { path, source })
}

/// Compiled policy ready to scan
#[derive(Debug)]
pub struct SecurityScanner {
    detector: Detector,
    filter: ScanFilter,
    max_file_size_bytes: u64,
}

impl SecurityScanner {
    pub fn from_policy(policy: &SecurityPolicy) -> Result<Self, SecurityError> {
        let detector = Detector::compile(policy)?;
        let filter = ScanFilter::new(&policy.text_extensions)
            .with_exclude_dirs(&[SECURITY_SCAN_DIR, AUDIT_LOG_DIR]);

        Ok(Self {
            detector,
            filter,
            max_file_size_bytes: policy.max_file_size_bytes,
        })
    }

    /// Scan every text-like file under `root`.
    pub fn scan(&self, root: &Path) -> Result<SecurityScanResult, SecurityError> {
        let mut scanned_files = 0;
        let mut skipped_files = 0;
        let mut violations = Vec::new();

        for path in scan(root, &self.filter) {
            let path = path?;
            let Some(file) = relative_key(root, &path) else {
                continue;
            };
            // the policy file quotes every pattern it defines
            if file == SECURITY_CONFIG_FILE {
                continue;
            }

            let io_err = |source| SecurityError::Io {
                path: path.clone(),
                source,
            };
            let size = fs::metadata(&path).map_err(io_err)?.len();
            if size > self.max_file_size_bytes {
                debug!(file = %file, size, "skipping oversized file");
                skipped_files += 1;
                continue;
            }

            let bytes = fs::read(&path).map_err(io_err)?;
            let text = String::from_utf8_lossy(&bytes);
            scanned_files += 1;

            for hit in self.detector.scan_text(&text) {
                warn!(
                    file = %file,
                    rule = %hit.name,
                    matches = hit.matches,
                    severity = %hit.severity,
                    "sensitive data pattern matched"
                );
                violations.push(Violation {
                    file: file.clone(),
                    rule: hit.name,
                    pattern: hit.pattern,
                    matches: hit.matches,
                    severity: hit.severity,
                });
            }
        }

        info!(
            scanned = scanned_files,
            skipped = skipped_files,
            violations = violations.len(),
            "security scan complete"
        );

        Ok(SecurityScanResult {
            scanned_files,
            skipped_files,
            sensitive_data_found: !violations.is_empty(),
            violations,
            timestamp: Utc::now(),
        })
    }
}

pub fn write_result(
    layout: &ArtifactLayout,
    result: &SecurityScanResult,
) -> Result<PathBuf, SecurityError> {
    let dir = layout.security_scan_dir();
    let path = layout.security_results_path();
    fs::create_dir_all(&dir).map_err(|source| SecurityError::Io {
        path: dir.clone(),
        source,
    })?;

    let json = serde_json::to_string_pretty(result).map_err(|source| SecurityError::ResultFile {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| SecurityError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Last persisted scan result, if any
pub fn load_latest_result(
    layout: &ArtifactLayout,
) -> Result<Option<SecurityScanResult>, SecurityError> {
    let path = layout.security_results_path();
    let json = match fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SecurityError::Io { path, source }),
    };

    serde_json::from_str(&json)
        .map(Some)
        .map_err(|source| SecurityError::ResultFile { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::ArtifactPhase;
    use artifact_secrets::PatternSpec;
    use tempfile::TempDir;

    fn scanner() -> SecurityScanner {
        SecurityScanner::from_policy(&SecurityPolicy::default()).unwrap()
    }

    fn store() -> (TempDir, ArtifactLayout) {
        let dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        for d in layout.skeleton_dirs() {
            fs::create_dir_all(d).unwrap();
        }
        (dir, layout)
    }

    #[test]
    fn test_password_assignment_is_high_severity() {
        let (_dir, layout) = store();
        let file = layout.phase_root(ArtifactPhase::Frontend).join("config.js");
        fs::write(&file, "const password = \"supersecret123\";\n").unwrap();

        let result = scanner().scan(layout.root()).unwrap();
        assert!(result.sensitive_data_found);
        assert_eq!(result.scanned_files, 1);
        let violation = &result.violations[0];
        assert_eq!(violation.file, "frontend/config.js");
        assert_eq!(violation.severity, Severity::High);
        assert!(violation.matches >= 1);
        assert_eq!(result.max_severity(), Some(Severity::High));
    }

    #[test]
    fn test_clean_tree_has_no_findings() {
        let (_dir, layout) = store();
        let file = layout.phase_root(ArtifactPhase::Testing).join("results.json");
        fs::write(&file, "{\"passed\": 12, \"failed\": 0}").unwrap();

        let result = scanner().scan(layout.root()).unwrap();
        assert_eq!(result.scanned_files, 1);
        assert!(!result.sensitive_data_found);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_non_text_files_not_read() {
        let (_dir, layout) = store();
        let file = layout.phase_root(ArtifactPhase::Frontend).join("logo.png");
        fs::write(&file, "password = hunter2").unwrap();

        let result = scanner().scan(layout.root()).unwrap();
        assert_eq!(result.scanned_files, 0);
    }

    #[test]
    fn test_own_output_and_policy_are_not_scanned() {
        let (_dir, layout) = store();
        write_policy(&layout, &SecurityPolicy::default()).unwrap();

        let leaky = layout.phase_root(ArtifactPhase::Backend).join("stack.yml");
        fs::write(&leaky, "api_key = abcdef\n").unwrap();

        let first = scanner().scan(layout.root()).unwrap();
        write_result(&layout, &first).unwrap();
        let second = scanner().scan(layout.root()).unwrap();

        assert_eq!(first.scanned_files, 1);
        assert_eq!(second.scanned_files, first.scanned_files);
        assert_eq!(second.violations, first.violations);
    }

    #[test]
    fn test_oversized_file_skipped() {
        let (_dir, layout) = store();
        let policy = SecurityPolicy {
            max_file_size_bytes: 8,
            ..SecurityPolicy::default()
        };
        let file = layout.phase_root(ArtifactPhase::Testing).join("big.log");
        fs::write(&file, "token = 0123456789abcdef").unwrap();

        let result = SecurityScanner::from_policy(&policy)
            .unwrap()
            .scan(layout.root())
            .unwrap();
        assert_eq!(result.scanned_files, 0);
        assert_eq!(result.skipped_files, 1);
        assert!(!result.sensitive_data_found);
    }

    #[test]
    fn test_missing_policy_falls_back_to_defaults() {
        let (_dir, layout) = store();
        assert_eq!(load_policy(&layout).unwrap(), SecurityPolicy::default());
    }

    #[test]
    fn test_custom_policy_round_trips_through_config_file() {
        let (_dir, layout) = store();
        let policy = SecurityPolicy {
            patterns: vec![PatternSpec::new("internal-host", r"corp\.internal", Severity::Medium)],
            ..SecurityPolicy::default()
        };
        write_policy(&layout, &policy).unwrap();
        assert_eq!(load_policy(&layout).unwrap(), policy);

        let file = layout.phase_root(ArtifactPhase::Backend).join("env.json");
        fs::write(&file, "{\"host\": \"db.corp.internal\"}").unwrap();
        let result = SecurityScanner::from_policy(&policy)
            .unwrap()
            .scan(layout.root())
            .unwrap();
        assert_eq!(result.violations[0].rule, "internal-host");
        assert_eq!(result.violations[0].severity, Severity::Medium);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let policy = SecurityPolicy {
            patterns: vec![PatternSpec::new("broken", "(unclosed", Severity::Low)],
            ..SecurityPolicy::default()
        };
        assert!(matches!(
            SecurityScanner::from_policy(&policy),
            Err(SecurityError::Pattern(_))
        ));
    }

    #[test]
    fn test_result_json_shape_and_reload() {
        let (_dir, layout) = store();
        assert_eq!(load_latest_result(&layout).unwrap(), None);

        let file = layout.phase_root(ArtifactPhase::Frontend).join("production.env");
        fs::write(&file, "SECRET=abc\nsecret = abc\n").unwrap();
        let result = scanner().scan(layout.root()).unwrap();
        let path = write_result(&layout, &result).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(value["scannedFiles"].is_number());
        assert!(value["sensitiveDataFound"].is_boolean());
        assert_eq!(value["violations"][0]["severity"], "high");

        assert_eq!(load_latest_result(&layout).unwrap(), Some(result));
    }
}
