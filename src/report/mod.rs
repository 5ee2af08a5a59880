//! Artifact report
//!
//! Combines the counters recorded in run metadata with a live recount of
//! every recorded phase. Both values are reported side by side with a
//! `drift` flag; neither is corrected from the other.

mod markdown;

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use markdown::to_markdown;

use artifact_secrets::Severity;

use crate::artifact::{live_stats, FinalizeError, LiveStats};
use crate::config::{ArtifactConfig, Compression, Encryption};
use crate::layout::ArtifactLayout;
use crate::metadata::{MetadataError, MetadataStore, PhaseStats};
use crate::phase::ArtifactPhase;
use crate::security::{load_latest_result, SecurityError, SecurityScanResult};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("failed to recount phase: {0}")]
    Recount(#[from] FinalizeError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run context copied from metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSection {
    pub branch: String,
    pub commit_id: String,
    pub build_id: String,
    pub environment: String,
    pub initialized: DateTime<Utc>,
}

/// Recorded versus live counters for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: ArtifactPhase,
    pub recorded: PhaseStats,
    /// `None` when the phase directory no longer exists
    pub live: Option<LiveStats>,
    pub drift: bool,
}

impl PhaseReport {
    fn new(phase: ArtifactPhase, recorded: PhaseStats, live: Option<LiveStats>) -> Self {
        let drift = match live {
            Some(live) => {
                live.file_count != recorded.count || live.total_size != recorded.total_size
            }
            None => recorded.count > 0,
        };
        Self {
            phase,
            recorded,
            live,
            drift,
        }
    }
}

/// Latest security scan, condensed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySummary {
    pub scanned_files: usize,
    pub skipped_files: usize,
    pub sensitive_data_found: bool,
    pub violation_count: usize,
    pub highest_severity: Option<Severity>,
    pub scanned_at: DateTime<Utc>,
}

impl From<&SecurityScanResult> for SecuritySummary {
    fn from(result: &SecurityScanResult) -> Self {
        Self {
            scanned_files: result.scanned_files,
            skipped_files: result.skipped_files,
            sensitive_data_found: result.sensitive_data_found,
            violation_count: result.violations.len(),
            highest_severity: result.max_severity(),
            scanned_at: result.timestamp,
        }
    }
}

/// Effective settings echoed for downstream tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub retention_days: u32,
    pub compression: Compression,
    pub encryption: Encryption,
    pub validation: bool,
}

impl From<&ArtifactConfig> for ReportSettings {
    fn from(config: &ArtifactConfig) -> Self {
        Self {
            retention_days: config.retention_days,
            compression: config.compression,
            encryption: config.encryption,
            validation: config.validation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReport {
    pub generated: DateTime<Utc>,
    pub project_root: String,
    pub run: RunSection,
    pub phases: Vec<PhaseReport>,
    pub security: Option<SecuritySummary>,
    pub settings: ReportSettings,
}

impl ArtifactReport {
    pub fn has_drift(&self) -> bool {
        self.phases.iter().any(|p| p.drift)
    }

    pub fn phase(&self, phase: ArtifactPhase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Where a written report landed
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

pub struct ReportGenerator<'a> {
    layout: &'a ArtifactLayout,
    config: &'a ArtifactConfig,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(layout: &'a ArtifactLayout, config: &'a ArtifactConfig) -> Self {
        Self { layout, config }
    }

    pub fn generate(&self) -> Result<ArtifactReport, ReportError> {
        let store = MetadataStore::new(self.layout, self.config.lock_timeout());
        let metadata = store.load()?;

        let mut phases = Vec::new();
        for phase in metadata.recorded_phases() {
            let Some(recorded) = metadata.phase_stats(phase).cloned() else {
                continue;
            };
            let live = live_stats(self.layout, phase, &self.config.phase_filter(phase))?;
            let report = PhaseReport::new(phase, recorded, live);
            if report.drift {
                warn!(
                    phase = %phase,
                    recorded = report.recorded.count,
                    live = ?report.live.map(|l| l.file_count),
                    "phase contents changed since finalize"
                );
            }
            phases.push(report);
        }

        let security = load_latest_result(self.layout)?
            .as_ref()
            .map(SecuritySummary::from);

        Ok(ArtifactReport {
            generated: Utc::now(),
            project_root: metadata.project_root,
            run: RunSection {
                branch: metadata.branch,
                commit_id: metadata.commit_id,
                build_id: metadata.build_id,
                environment: metadata.environment,
                initialized: metadata.initialized,
            },
            phases,
            security,
            settings: ReportSettings::from(self.config),
        })
    }

    /// Persist `artifact-report.json` and `artifact-report.md`.
    pub fn write(&self, report: &ArtifactReport) -> Result<ReportPaths, ReportError> {
        let dir = self.layout.audit_log_dir();
        fs::create_dir_all(&dir).map_err(|source| ReportError::Write {
            path: dir.clone(),
            source,
        })?;

        let paths = ReportPaths {
            json: self.layout.report_json_path(),
            markdown: self.layout.report_markdown_path(),
        };
        fs::write(&paths.json, report.to_json()?).map_err(|source| ReportError::Write {
            path: paths.json.clone(),
            source,
        })?;
        fs::write(&paths.markdown, to_markdown(report)).map_err(|source| ReportError::Write {
            path: paths.markdown.clone(),
            source,
        })?;

        info!(path = %paths.json.display(), phases = report.phases.len(), "report written");
        Ok(paths)
    }
}
