//! Artifact collector
//!
//! Copies files matched by a [`CollectionRule`] from each of its candidate
//! source roots into `artifacts/<phase>/<category>/`, mirroring the path
//! relative to the source root. Sources are never modified. The first
//! failed copy aborts the whole collection.
//!
//! When two roots of one rule hold the same relative path, the file from
//! the earlier root is kept and the later one is skipped with a warning.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::layout::ArtifactLayout;
use crate::phase::ArtifactPhase;
use crate::scan::{scan, ScanError, ScanFilter};

/// Where a category of artifacts comes from and where it goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRule {
    /// Destination phase (never `metadata`)
    pub phase: ArtifactPhase,

    /// Subdirectory under the phase root
    pub category: String,

    /// Candidate source roots relative to the project root; absent ones are skipped
    pub sources: Vec<String>,

    /// Allowed extensions with leading dot
    pub extensions: Vec<String>,

    /// Directory names pruned while scanning
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
}

impl CollectionRule {
    pub fn filter(&self) -> ScanFilter {
        ScanFilter::new(&self.extensions).with_exclude_dirs(&self.exclude_dirs)
    }

    /// Destination directory for this rule
    pub fn destination_root(&self, layout: &ArtifactLayout) -> PathBuf {
        layout.phase_root(self.phase).join(&self.category)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.phase == ArtifactPhase::Metadata {
            return Err("rules cannot target the metadata phase".to_string());
        }
        if self.category.is_empty()
            || self.category.contains(['/', '\\'])
            || self.category == ".."
            || self.category == "."
        {
            return Err(format!("invalid category '{}'", self.category));
        }
        if self.sources.is_empty() {
            return Err("at least one source root is required".to_string());
        }
        if self.extensions.is_empty() {
            return Err("at least one extension is required".to_string());
        }
        if let Some(ext) = self.extensions.iter().find(|e| !e.starts_with('.') || e.len() < 2) {
            return Err(format!("extension '{}' must start with '.'", ext));
        }
        Ok(())
    }
}

/// One file to be copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Rule category
    #[serde(rename = "type")]
    pub category: String,
}

/// Result of one collection call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOutcome {
    /// Files copied (or that would be copied in dry-run)
    pub copied: usize,

    /// Bytes copied (source sizes in dry-run)
    pub bytes: u64,

    /// Source roots that existed and were scanned
    pub roots_scanned: Vec<PathBuf>,

    /// Source roots that did not exist
    pub roots_missing: Vec<PathBuf>,

    /// Files skipped because an earlier root already supplied the same destination
    pub shadowed: Vec<PathBuf>,

    pub dry_run: bool,
}

/// Collection errors
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to copy {source_path} to {destination}: {error}")]
    Copy {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("failed to stat {path}: {error}")]
    Stat {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
}

/// Copies rule matches into the artifact store
#[derive(Debug)]
pub struct Collector<'a> {
    layout: &'a ArtifactLayout,
    dry_run: bool,
}

impl<'a> Collector<'a> {
    pub fn new(layout: &'a ArtifactLayout, dry_run: bool) -> Self {
        Self { layout, dry_run }
    }

    /// Records for every file the rule currently matches, without copying.
    pub fn plan(&self, rule: &CollectionRule) -> Result<Vec<ArtifactRecord>, CollectError> {
        let mut records = Vec::new();
        for root in self.existing_roots(rule).0 {
            for path in scan(&root, &rule.filter()) {
                let path = path?;
                if let Some(record) = self.record_for(rule, &root, path) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Copy every match of `rule`, returning counts.
    pub fn collect(&self, rule: &CollectionRule) -> Result<CollectionOutcome, CollectError> {
        let (roots, missing) = self.existing_roots(rule);
        let mut outcome = CollectionOutcome {
            dry_run: self.dry_run,
            roots_missing: missing,
            ..CollectionOutcome::default()
        };

        for root in &outcome.roots_missing {
            debug!(root = %root.display(), "source root absent, skipping");
        }

        let filter = rule.filter();
        let mut destinations = HashSet::new();
        for root in roots {
            for path in scan(&root, &filter) {
                let path = path?;
                let Some(record) = self.record_for(rule, &root, path) else {
                    continue;
                };
                if !destinations.insert(record.destination_path.clone()) {
                    warn!(
                        source = %record.source_path.display(),
                        destination = %record.destination_path.display(),
                        "destination already collected from an earlier root, skipping"
                    );
                    outcome.shadowed.push(record.source_path);
                    continue;
                }
                outcome.bytes += self.copy(&record)?;
                outcome.copied += 1;
            }
            outcome.roots_scanned.push(root);
        }

        info!(
            phase = %rule.phase,
            category = %rule.category,
            files = outcome.copied,
            bytes = outcome.bytes,
            dry_run = self.dry_run,
            "collection complete"
        );

        Ok(outcome)
    }

    fn existing_roots(&self, rule: &CollectionRule) -> (Vec<PathBuf>, Vec<PathBuf>) {
        rule.sources
            .iter()
            .map(|s| self.layout.project_root().join(s))
            .partition(|p| p.exists())
    }

    /// Map a source file to its destination. Files already inside the
    /// artifact store are ignored so a broad source root never re-collects
    /// its own output.
    fn record_for(&self, rule: &CollectionRule, root: &Path, path: PathBuf) -> Option<ArtifactRecord> {
        if path.starts_with(self.layout.root()) {
            return None;
        }
        let rel = path.strip_prefix(root).ok()?.to_path_buf();
        Some(ArtifactRecord {
            destination_path: rule.destination_root(self.layout).join(rel),
            source_path: path,
            category: rule.category.clone(),
        })
    }

    fn copy(&self, record: &ArtifactRecord) -> Result<u64, CollectError> {
        if self.dry_run {
            debug!(
                from = %record.source_path.display(),
                to = %record.destination_path.display(),
                "would copy"
            );
            let meta = fs::metadata(&record.source_path).map_err(|error| CollectError::Stat {
                path: record.source_path.clone(),
                error,
            })?;
            return Ok(meta.len());
        }

        let copy_err = |error: io::Error| CollectError::Copy {
            source_path: record.source_path.clone(),
            destination: record.destination_path.clone(),
            error,
        };

        if let Some(parent) = record.destination_path.parent() {
            fs::create_dir_all(parent).map_err(copy_err)?;
        }
        let bytes = fs::copy(&record.source_path, &record.destination_path).map_err(copy_err)?;

        debug!(
            from = %record.source_path.display(),
            to = %record.destination_path.display(),
            bytes,
            "copied"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn rule() -> CollectionRule {
        CollectionRule {
            phase: ArtifactPhase::Frontend,
            category: "build".to_string(),
            sources: vec![".next".to_string(), "out".to_string()],
            extensions: vec![".js".to_string(), ".css".to_string()],
            exclude_dirs: vec!["cache".to_string()],
        }
    }

    fn create_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let next = dir.path().join(".next");
        fs::create_dir_all(next.join("static/chunks")).unwrap();
        fs::create_dir_all(next.join("cache/webpack")).unwrap();
        fs::write(next.join("static/chunks/main.js"), "console.log(1)").unwrap();
        fs::write(next.join("static/app.css"), "body{}").unwrap();
        fs::write(next.join("BUILD_ID"), "abc").unwrap();
        fs::write(next.join("cache/webpack/pack.js"), "cached").unwrap();
        dir
    }

    fn files_under(root: &Path) -> Vec<PathBuf> {
        if !root.exists() {
            return Vec::new();
        }
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    #[test]
    fn test_collect_mirrors_relative_paths() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());

        let outcome = Collector::new(&layout, false).collect(&rule()).unwrap();

        assert_eq!(outcome.copied, 2);
        let dest = layout.phase_root(ArtifactPhase::Frontend).join("build");
        assert_eq!(
            fs::read_to_string(dest.join("static/chunks/main.js")).unwrap(),
            "console.log(1)"
        );
        assert!(dest.join("static/app.css").exists());
        assert!(!dest.join("cache").exists());
        assert!(!dest.join("BUILD_ID").exists());
    }

    #[test]
    fn test_missing_roots_skipped() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());

        let outcome = Collector::new(&layout, false).collect(&rule()).unwrap();

        assert_eq!(outcome.roots_scanned, vec![dir.path().join(".next")]);
        assert_eq!(outcome.roots_missing, vec![dir.path().join("out")]);
    }

    #[test]
    fn test_no_roots_is_zero_not_error() {
        let dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let outcome = Collector::new(&layout, false).collect(&rule()).unwrap();
        assert_eq!(outcome.copied, 0);
    }

    #[test]
    fn test_collect_is_idempotent() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());
        let collector = Collector::new(&layout, false);
        let dest = layout.phase_root(ArtifactPhase::Frontend);

        let first = collector.collect(&rule()).unwrap();
        let tree_first: Vec<(PathBuf, Vec<u8>)> = files_under(&dest)
            .into_iter()
            .map(|p| {
                let bytes = fs::read(&p).unwrap();
                (p, bytes)
            })
            .collect();

        let second = collector.collect(&rule()).unwrap();
        let tree_second: Vec<(PathBuf, Vec<u8>)> = files_under(&dest)
            .into_iter()
            .map(|p| {
                let bytes = fs::read(&p).unwrap();
                (p, bytes)
            })
            .collect();

        assert_eq!(first.copied, second.copied);
        assert_eq!(tree_first, tree_second);
    }

    #[test]
    fn test_overwrites_stale_destination() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());
        let collector = Collector::new(&layout, false);
        collector.collect(&rule()).unwrap();

        fs::write(dir.path().join(".next/static/app.css"), "body{color:red}").unwrap();
        collector.collect(&rule()).unwrap();

        let copied = layout
            .phase_root(ArtifactPhase::Frontend)
            .join("build/static/app.css");
        assert_eq!(fs::read_to_string(copied).unwrap(), "body{color:red}");
    }

    #[test]
    fn test_sources_untouched() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());
        let before = files_under(&dir.path().join(".next"));
        Collector::new(&layout, false).collect(&rule()).unwrap();
        assert_eq!(before, files_under(&dir.path().join(".next")));
    }

    #[test]
    fn test_dry_run_counts_without_writing() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());

        let dry = Collector::new(&layout, true).collect(&rule()).unwrap();
        assert!(dry.dry_run);
        assert!(files_under(layout.root()).is_empty());

        let real = Collector::new(&layout, false).collect(&rule()).unwrap();
        assert_eq!(dry.copied, real.copied);
        assert_eq!(dry.bytes, real.bytes);
    }

    #[test]
    fn test_same_relative_path_in_two_roots_keeps_first() {
        let dir = create_project();
        fs::create_dir_all(dir.path().join("out/static")).unwrap();
        fs::write(dir.path().join("out/static/app.css"), "body{color:blue}").unwrap();
        fs::write(dir.path().join("out/extra.js"), "extra").unwrap();
        let layout = ArtifactLayout::new(dir.path());

        let outcome = Collector::new(&layout, false).collect(&rule()).unwrap();

        let dest = layout.phase_root(ArtifactPhase::Frontend);
        assert_eq!(outcome.copied, 3);
        assert_eq!(outcome.copied, files_under(&dest).len());
        assert_eq!(outcome.shadowed, vec![dir.path().join("out/static/app.css")]);
        assert_eq!(
            fs::read_to_string(dest.join("build/static/app.css")).unwrap(),
            "body{}"
        );

        let dry = Collector::new(&layout, true).collect(&rule()).unwrap();
        assert_eq!(dry.copied, outcome.copied);
        assert_eq!(dry.bytes, outcome.bytes);
    }

    #[test]
    fn test_plan_lists_records() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());
        let records = Collector::new(&layout, false).plan(&rule()).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.category == "build"));
        assert!(records[0]
            .destination_path
            .starts_with(layout.phase_root(ArtifactPhase::Frontend).join("build")));
    }

    #[test]
    fn test_artifact_store_never_recollected() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());
        fs::create_dir_all(layout.phase_root(ArtifactPhase::Frontend)).unwrap();
        fs::write(layout.phase_root(ArtifactPhase::Frontend).join("old.js"), "x").unwrap();

        let broad = CollectionRule {
            sources: vec![".".to_string()],
            ..rule()
        };
        let records = Collector::new(&layout, false).plan(&broad).unwrap();
        assert!(records.iter().all(|r| !r.source_path.starts_with(layout.root())));
    }

    #[test]
    fn test_copy_failure_aborts() {
        let dir = create_project();
        let layout = ArtifactLayout::new(dir.path());
        // A file where the category directory should be
        fs::create_dir_all(layout.phase_root(ArtifactPhase::Frontend)).unwrap();
        fs::write(layout.phase_root(ArtifactPhase::Frontend).join("build"), "not a dir").unwrap();

        let err = Collector::new(&layout, false).collect(&rule()).unwrap_err();
        assert!(matches!(err, CollectError::Copy { .. }));
    }

    #[test]
    fn test_rule_validation() {
        assert!(rule().validate().is_ok());

        let bad_phase = CollectionRule {
            phase: ArtifactPhase::Metadata,
            ..rule()
        };
        assert!(bad_phase.validate().is_err());

        let bad_ext = CollectionRule {
            extensions: vec!["js".to_string()],
            ..rule()
        };
        assert!(bad_ext.validate().unwrap_err().contains("'js'"));

        let bad_category = CollectionRule {
            category: "../escape".to_string(),
            ..rule()
        };
        assert!(bad_category.validate().is_err());
    }
}
