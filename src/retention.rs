//! Age-based retention for the artifact store
//!
//! Removes files under `artifacts/<phase>/` whose modification time is older
//! than the configured retention window, then prunes directories left empty.
//! Run metadata, the security policy and the lock file live at the store root
//! and are never visited; per-phase checksum and manifest files are kept.
//! Runs under the metadata lock so it cannot interleave with a finalize.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ArtifactConfig;
use crate::layout::{is_phase_bookkeeping, relative_key, ArtifactLayout};
use crate::metadata::{LockError, MetadataLock};
use crate::phase::ArtifactPhase;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to walk artifact store: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Retention policy for artifact files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum age in days (0 = unlimited)
    pub retention_days: u32,
    /// Log but don't delete
    #[serde(default)]
    pub dry_run: bool,
}

impl RetentionPolicy {
    pub fn keep_days(days: u32) -> Self {
        Self {
            retention_days: days,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self {
            retention_days: config.retention_days,
            dry_run: config.dry_run,
        }
    }

    fn max_age(&self) -> Option<Duration> {
        (self.retention_days > 0)
            .then(|| Duration::from_secs(u64::from(self.retention_days) * SECONDS_PER_DAY))
    }
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    /// Files examined
    pub scanned: usize,
    /// Files deleted (or that would be, in dry-run)
    pub deleted: usize,
    pub bytes_reclaimed: u64,
    pub removed_dirs: usize,
    pub dry_run: bool,
    /// Errors encountered (non-fatal)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct ArtifactCleanup<'a> {
    layout: &'a ArtifactLayout,
    policy: RetentionPolicy,
    lock_timeout: Duration,
}

impl<'a> ArtifactCleanup<'a> {
    pub fn new(layout: &'a ArtifactLayout, policy: RetentionPolicy, lock_timeout: Duration) -> Self {
        Self {
            layout,
            policy,
            lock_timeout,
        }
    }

    pub fn run(&self) -> Result<CleanupResult, CleanupError> {
        self.run_at(SystemTime::now())
    }

    /// Apply the policy as if the current time were `now`.
    pub fn run_at(&self, now: SystemTime) -> Result<CleanupResult, CleanupError> {
        let mut result = CleanupResult {
            dry_run: self.policy.dry_run,
            ..CleanupResult::default()
        };

        let Some(max_age) = self.policy.max_age() else {
            info!("retention disabled, nothing to clean");
            return Ok(result);
        };
        if !self.layout.root().exists() {
            return Ok(result);
        }

        let _lock = MetadataLock::acquire(&self.layout.lock_path(), self.lock_timeout)?;

        for phase in ArtifactPhase::ALL {
            let phase_root = self.layout.phase_root(phase);
            if !phase_root.is_dir() {
                continue;
            }
            self.expire_files(&phase_root, now, max_age, &mut result)?;
            if !self.policy.dry_run {
                self.prune_empty_dirs(&phase_root, &mut result);
            }
        }

        info!(
            scanned = result.scanned,
            deleted = result.deleted,
            bytes = result.bytes_reclaimed,
            dry_run = result.dry_run,
            "retention cleanup complete"
        );
        Ok(result)
    }

    fn expire_files(
        &self,
        phase_root: &Path,
        now: SystemTime,
        max_age: Duration,
        result: &mut CleanupResult,
    ) -> Result<(), CleanupError> {
        for entry in WalkDir::new(phase_root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = relative_key(phase_root, entry.path()) else {
                continue;
            };
            if is_phase_bookkeeping(&key) {
                continue;
            }
            result.scanned += 1;

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    result.errors.push(format!("{}: {}", entry.path().display(), e));
                    continue;
                }
            };
            let expired = metadata
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .is_some_and(|age| age > max_age);
            if !expired {
                continue;
            }

            if self.policy.dry_run {
                info!(file = %entry.path().display(), bytes = metadata.len(), "dry-run: would delete");
            } else if let Err(e) = fs::remove_file(entry.path()) {
                warn!(file = %entry.path().display(), error = %e, "failed to delete");
                result.errors.push(format!("{}: {}", entry.path().display(), e));
                continue;
            } else {
                debug!(file = %entry.path().display(), bytes = metadata.len(), "deleted");
            }

            result.deleted += 1;
            result.bytes_reclaimed += metadata.len();
        }
        Ok(())
    }

    /// Remove directories left empty, deepest first. Skeleton dirs stay.
    fn prune_empty_dirs(&self, phase_root: &Path, result: &mut CleanupResult) {
        let keep = self.layout.skeleton_dirs();
        let dirs = WalkDir::new(phase_root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir());

        for dir in dirs {
            if keep.iter().any(|k| k == dir.path()) {
                continue;
            }
            let is_empty = fs::read_dir(dir.path())
                .map(|mut it| it.next().is_none())
                .unwrap_or(false);
            if is_empty {
                match fs::remove_dir(dir.path()) {
                    Ok(()) => result.removed_dirs += 1,
                    Err(e) => result.errors.push(format!("{}: {}", dir.path().display(), e)),
                }
            }
        }
    }
}
