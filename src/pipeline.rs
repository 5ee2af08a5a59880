//! Task dispatch for the artifact manager
//!
//! [`ArtifactManager`] owns the layout and effective configuration and maps
//! each [`Task`] onto the component that implements it. Ordering between
//! tasks is the caller's responsibility, except for `test:artifacts`, which
//! runs the whole lifecycle in order and stops at the first error.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{
    finalize_phase, validate_phase, FinalizeError, FinalizeOutcome, ValidateError,
    ValidationSummary,
};
use crate::collect::{CollectError, CollectionOutcome, Collector};
use crate::config::{ArtifactConfig, ConfigError};
use crate::layout::ArtifactLayout;
use crate::metadata::{MetadataError, MetadataStore, RunMetadata};
use crate::phase::ArtifactPhase;
use crate::report::{to_markdown, ArtifactReport, ReportError, ReportGenerator, ReportPaths};
use crate::retention::{ArtifactCleanup, CleanupError, CleanupResult, RetentionPolicy};
use crate::security::{
    load_policy, write_policy, write_result, SecurityError, SecurityScanResult, SecurityScanner,
};
use crate::task::Task;

/// Phases finalized and validated by `test:artifacts`
pub const SCENARIO_PHASES: [ArtifactPhase; 3] = [
    ArtifactPhase::Backend,
    ArtifactPhase::Frontend,
    ArtifactPhase::Testing,
];

/// Errors from any artifact manager task
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown collection source '{name}' (configured: {known})")]
    UnknownSource { name: String, known: String },

    #[error("no artifacts present for phase {phase} at {}", .path.display())]
    MissingArtifacts { phase: ArtifactPhase, path: PathBuf },

    #[error("failed to create {path}: {source}")]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("collection failed: {0}")]
    Collect(#[from] CollectError),

    #[error("security scan failed: {0}")]
    Security(#[from] SecurityError),

    #[error("finalize failed: {0}")]
    Finalize(#[from] FinalizeError),

    #[error("validation failed: {0}")]
    Validate(#[from] ValidateError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("report failed: {0}")]
    Report(#[from] ReportError),

    #[error("cleanup failed: {0}")]
    Cleanup(#[from] CleanupError),
}

impl ArtifactError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Phase directory presence reported by `download:<phase>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCheck {
    pub phase: ArtifactPhase,
    pub path: PathBuf,
    pub entries: usize,
}

/// What `test:artifacts` did
#[derive(Debug, Clone)]
pub struct ScenarioSummary {
    pub collected: Vec<(String, CollectionOutcome)>,
    pub security: SecurityScanResult,
    pub finalized: Vec<FinalizeOutcome>,
    /// Empty when validation is disabled
    pub validated: Vec<ValidationSummary>,
    pub report: ArtifactReport,
}

/// Result of one task
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Initialized { root: PathBuf },
    Collected(CollectionOutcome),
    Scanned(SecurityScanResult),
    Finalized(FinalizeOutcome),
    Validated(ValidationSummary),
    Downloaded(DownloadCheck),
    Reported {
        report: ArtifactReport,
        paths: ReportPaths,
    },
    Cleaned(CleanupResult),
    Scenario(Box<ScenarioSummary>),
}

impl TaskOutcome {
    /// One-screen summary for stdout
    pub fn to_human(&self) -> String {
        match self {
            TaskOutcome::Initialized { root } => {
                format!("Initialized artifact store at {}", root.display())
            }
            TaskOutcome::Collected(outcome) => format!(
                "{} {} files ({} bytes) from {} source roots ({} missing)",
                if outcome.dry_run { "Would collect" } else { "Collected" },
                outcome.copied,
                outcome.bytes,
                outcome.roots_scanned.len(),
                outcome.roots_missing.len()
            ),
            TaskOutcome::Scanned(result) => {
                let mut out = format!(
                    "Scanned {} files ({} skipped): {} violations",
                    result.scanned_files,
                    result.skipped_files,
                    result.violations.len()
                );
                for v in &result.violations {
                    out.push_str(&format!(
                        "\n  [{}] {} matched {} ({}x)",
                        v.severity, v.file, v.rule, v.matches
                    ));
                }
                out
            }
            TaskOutcome::Finalized(outcome) => format!(
                "Finalized {}: {} files, {} bytes",
                outcome.phase, outcome.file_count, outcome.total_size
            ),
            TaskOutcome::Validated(summary) => format!(
                "Validated {}: {} checksums verified, {} skipped (missing), {} manifest entries",
                summary.phase, summary.verified, summary.skipped_missing, summary.manifest_entries
            ),
            TaskOutcome::Downloaded(check) => format!(
                "{} artifacts present at {} ({} entries)",
                check.phase,
                check.path.display(),
                check.entries
            ),
            TaskOutcome::Reported { report, .. } => to_markdown(report),
            TaskOutcome::Cleaned(result) => format!(
                "{} {} of {} files ({} bytes), removed {} empty directories",
                if result.dry_run { "Would delete" } else { "Deleted" },
                result.deleted,
                result.scanned,
                result.bytes_reclaimed,
                result.removed_dirs
            ),
            TaskOutcome::Scenario(summary) => {
                let copied: usize = summary.collected.iter().map(|(_, o)| o.copied).sum();
                format!(
                    "Artifact scenario complete: {} files collected, {} phases finalized, \
                     {} validated, {} security violations\n\n{}",
                    copied,
                    summary.finalized.len(),
                    summary.validated.len(),
                    summary.security.violations.len(),
                    to_markdown(&summary.report)
                )
            }
        }
    }

    /// Machine-readable form, for outcomes that have one
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            TaskOutcome::Scanned(result) => Some(serde_json::to_string_pretty(result)),
            TaskOutcome::Downloaded(check) => Some(serde_json::to_string_pretty(check)),
            TaskOutcome::Reported { report, .. } => Some(report.to_json()),
            TaskOutcome::Cleaned(result) => Some(serde_json::to_string_pretty(result)),
            TaskOutcome::Scenario(summary) => Some(summary.report.to_json()),
            _ => None,
        }
    }
}

/// Runs tasks against one project
#[derive(Debug)]
pub struct ArtifactManager {
    layout: ArtifactLayout,
    config: ArtifactConfig,
}

impl ArtifactManager {
    pub fn new(layout: ArtifactLayout, config: ArtifactConfig) -> Self {
        Self { layout, config }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    fn metadata_store(&self) -> MetadataStore {
        MetadataStore::new(&self.layout, self.config.lock_timeout())
    }

    pub fn execute(&self, task: &Task) -> Result<TaskOutcome, ArtifactError> {
        info!(task = %task, root = %self.layout.project_root().display(), "running task");
        let outcome = match task {
            Task::Init => {
                self.init()?;
                TaskOutcome::Initialized {
                    root: self.layout.root().to_path_buf(),
                }
            }
            Task::Collect(source) => TaskOutcome::Collected(self.collect(source)?),
            Task::SecurityScan => TaskOutcome::Scanned(self.security_scan()?),
            Task::Finalize(phase) => TaskOutcome::Finalized(self.finalize(*phase)?),
            Task::Validate(phase) => TaskOutcome::Validated(self.validate(*phase)?),
            Task::Download(phase) => TaskOutcome::Downloaded(self.download(*phase)?),
            Task::Report => {
                let (report, paths) = self.report()?;
                TaskOutcome::Reported { report, paths }
            }
            Task::Cleanup => TaskOutcome::Cleaned(self.cleanup()?),
            Task::TestArtifacts => TaskOutcome::Scenario(Box::new(self.run_all()?)),
        };
        Ok(outcome)
    }

    /// Create the store skeleton, fresh run metadata and, if absent, the
    /// security policy.
    pub fn init(&self) -> Result<(), ArtifactError> {
        for dir in self.layout.skeleton_dirs() {
            fs::create_dir_all(&dir).map_err(|source| ArtifactError::Layout {
                path: dir.clone(),
                source,
            })?;
        }

        let metadata = RunMetadata::new(self.layout.project_root(), &self.config.run);
        self.metadata_store().initialize(&metadata)?;

        if self.layout.security_config_path().exists() {
            debug!("security config already present, keeping it");
        } else {
            write_policy(&self.layout, &Default::default())?;
        }

        info!(
            root = %self.layout.root().display(),
            branch = %metadata.branch,
            build = %metadata.build_id,
            "artifact store initialized"
        );
        Ok(())
    }

    pub fn collect(&self, source: &str) -> Result<CollectionOutcome, ArtifactError> {
        let rule = self
            .config
            .rule(source)
            .ok_or_else(|| ArtifactError::UnknownSource {
                name: source.to_string(),
                known: self
                    .config
                    .sources
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        Ok(Collector::new(&self.layout, self.config.dry_run).collect(rule)?)
    }

    pub fn security_scan(&self) -> Result<SecurityScanResult, ArtifactError> {
        let policy = load_policy(&self.layout)?;
        let result = SecurityScanner::from_policy(&policy)?.scan(self.layout.root())?;
        let path = write_result(&self.layout, &result)?;
        debug!(path = %path.display(), "scan result written");
        Ok(result)
    }

    pub fn finalize(&self, phase: ArtifactPhase) -> Result<FinalizeOutcome, ArtifactError> {
        let filter = self.config.phase_filter(phase);
        Ok(finalize_phase(
            &self.layout,
            phase,
            &filter,
            &self.metadata_store(),
        )?)
    }

    pub fn validate(&self, phase: ArtifactPhase) -> Result<ValidationSummary, ArtifactError> {
        Ok(validate_phase(&self.layout, phase)?)
    }

    /// Local stand-in for fetching a phase from remote storage: succeeds when
    /// the phase directory exists.
    pub fn download(&self, phase: ArtifactPhase) -> Result<DownloadCheck, ArtifactError> {
        let path = self.layout.phase_root(phase);
        let entries = match fs::read_dir(&path) {
            Ok(dir) => dir.count(),
            Err(_) => return Err(ArtifactError::MissingArtifacts { phase, path }),
        };
        info!(phase = %phase, entries, "artifacts available locally");
        Ok(DownloadCheck {
            phase,
            path,
            entries,
        })
    }

    pub fn report(&self) -> Result<(ArtifactReport, ReportPaths), ArtifactError> {
        let generator = ReportGenerator::new(&self.layout, &self.config);
        let report = generator.generate()?;
        let paths = generator.write(&report)?;
        Ok((report, paths))
    }

    pub fn cleanup(&self) -> Result<CleanupResult, ArtifactError> {
        let cleanup = ArtifactCleanup::new(
            &self.layout,
            RetentionPolicy::from_config(&self.config),
            self.config.lock_timeout(),
        );
        Ok(cleanup.run()?)
    }

    /// init → collect (every rule) → scan → finalize → validate → report
    pub fn run_all(&self) -> Result<ScenarioSummary, ArtifactError> {
        self.init()?;

        let mut collected = Vec::new();
        for name in self.config.sources.keys() {
            let outcome = self.collect(name)?;
            collected.push((name.clone(), outcome));
        }

        let security = self.security_scan()?;

        let mut finalized = Vec::new();
        for phase in SCENARIO_PHASES {
            finalized.push(self.finalize(phase)?);
        }

        let mut validated = Vec::new();
        if self.config.validation {
            for phase in SCENARIO_PHASES {
                validated.push(self.validate(phase)?);
            }
        } else {
            info!("validation disabled, skipping");
        }

        let (report, _) = self.report()?;

        Ok(ScenarioSummary {
            collected,
            security,
            finalized,
            validated,
            report,
        })
    }
}
