//! Run metadata (`artifacts/metadata.json`)
//!
//! One document per pipeline run: created by `init`, updated by every
//! `finalize`, read by `report`. Updates are read-merge-write under
//! [`MetadataLock`] and land via rename so readers never see a torn file.

mod lock;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use lock::{LockError, MetadataLock};

use crate::config::RunIdentity;
use crate::layout::ArtifactLayout;
use crate::phase::ArtifactPhase;

/// Counters recorded for a phase at its last finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStats {
    pub count: usize,
    pub total_size: u64,
    pub last_updated: DateTime<Utc>,
}

/// Run-level metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub project_root: String,
    pub initialized: DateTime<Utc>,
    pub branch: String,
    pub commit_id: String,
    pub build_id: String,
    pub environment: String,

    /// Keyed by phase name
    #[serde(default)]
    pub artifacts: BTreeMap<String, PhaseStats>,
}

impl RunMetadata {
    /// Fresh metadata for a new run
    pub fn new(project_root: &Path, run: &RunIdentity) -> Self {
        Self {
            project_root: project_root.to_string_lossy().to_string(),
            initialized: Utc::now(),
            branch: run.branch.clone(),
            commit_id: run.commit_id.clone(),
            build_id: run.build_id.clone(),
            environment: run.environment.clone(),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn phase_stats(&self, phase: ArtifactPhase) -> Option<&PhaseStats> {
        self.artifacts.get(phase.as_str())
    }

    pub fn record_phase(&mut self, phase: ArtifactPhase, stats: PhaseStats) {
        self.artifacts.insert(phase.as_str().to_string(), stats);
    }

    /// Recorded phases that parse as known phases, in canonical order
    pub fn recorded_phases(&self) -> Vec<ArtifactPhase> {
        ArtifactPhase::ALL
            .iter()
            .copied()
            .filter(|p| self.artifacts.contains_key(p.as_str()))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("run metadata not found at {0}; run `init` first")]
    NotInitialized(PathBuf),

    #[error("metadata I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed metadata {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Access to the metadata document of one artifact store
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl MetadataStore {
    pub fn new(layout: &ArtifactLayout, lock_timeout: Duration) -> Self {
        Self {
            path: layout.metadata_path(),
            lock_path: layout.lock_path(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the document (used by `init`)
    pub fn initialize(&self, metadata: &RunMetadata) -> Result<(), MetadataError> {
        let _lock = MetadataLock::acquire(&self.lock_path, self.lock_timeout)?;
        self.write(metadata)
    }

    pub fn load(&self) -> Result<RunMetadata, MetadataError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MetadataError::NotInitialized(self.path.clone()));
            }
            Err(source) => {
                return Err(MetadataError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&json).map_err(|source| MetadataError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Read, apply `f`, write back, all under the lock.
    pub fn update<F>(&self, f: F) -> Result<RunMetadata, MetadataError>
    where
        F: FnOnce(&mut RunMetadata),
    {
        self.try_update(|metadata| {
            f(metadata);
            Ok::<(), MetadataError>(())
        })
    }

    /// Like [`update`](Self::update), but `f` may fail. `f` runs only once the
    /// lock is held and the document has loaded; on error nothing is written.
    pub fn try_update<F, E>(&self, f: F) -> Result<RunMetadata, E>
    where
        F: FnOnce(&mut RunMetadata) -> Result<(), E>,
        E: From<MetadataError>,
    {
        let _lock = MetadataLock::acquire(&self.lock_path, self.lock_timeout)
            .map_err(MetadataError::from)?;
        let mut metadata = self.load()?;
        f(&mut metadata)?;
        self.write(&metadata)?;
        Ok(metadata)
    }

    fn write(&self, metadata: &RunMetadata) -> Result<(), MetadataError> {
        let io_err = |source| MetadataError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(metadata).map_err(|source| MetadataError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> RunIdentity {
        RunIdentity {
            branch: "main".to_string(),
            commit_id: "abc123".to_string(),
            build_id: "42".to_string(),
            environment: "production".to_string(),
        }
    }

    fn store(dir: &TempDir) -> MetadataStore {
        MetadataStore::new(&ArtifactLayout::new(dir.path()), Duration::from_secs(1))
    }

    fn stats(count: usize) -> PhaseStats {
        PhaseStats {
            count,
            total_size: count as u64 * 10,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_initialize_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let metadata = RunMetadata::new(dir.path(), &identity());

        store.initialize(&metadata).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, metadata);
        assert!(loaded.artifacts.is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut metadata = RunMetadata::new(dir.path(), &identity());
        metadata.record_phase(ArtifactPhase::Backend, stats(3));
        store.initialize(&metadata).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["commitId"], "abc123");
        assert_eq!(value["buildId"], "42");
        assert_eq!(value["artifacts"]["backend"]["count"], 3);
        assert_eq!(value["artifacts"]["backend"]["totalSize"], 30);
        assert!(value["artifacts"]["backend"]["lastUpdated"].is_string());
    }

    #[test]
    fn test_load_before_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).load(),
            Err(MetadataError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_update_merges_phases() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .initialize(&RunMetadata::new(dir.path(), &identity()))
            .unwrap();

        store
            .update(|m| m.record_phase(ArtifactPhase::Backend, stats(2)))
            .unwrap();
        let updated = store
            .update(|m| m.record_phase(ArtifactPhase::Frontend, stats(5)))
            .unwrap();

        assert_eq!(updated.phase_stats(ArtifactPhase::Backend).unwrap().count, 2);
        assert_eq!(updated.phase_stats(ArtifactPhase::Frontend).unwrap().count, 5);
        assert_eq!(
            store.load().unwrap().recorded_phases(),
            vec![ArtifactPhase::Backend, ArtifactPhase::Frontend]
        );
    }

    #[test]
    fn test_failed_try_update_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .initialize(&RunMetadata::new(dir.path(), &identity()))
            .unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let result = store.try_update(|m| {
            m.record_phase(ArtifactPhase::Backend, stats(4));
            Err(MetadataError::NotInitialized(PathBuf::from("elsewhere")))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_try_update_skips_closure_before_init() {
        let dir = TempDir::new().unwrap();
        let mut called = false;
        let result = store(&dir).try_update(|_| {
            called = true;
            Ok::<(), MetadataError>(())
        });
        assert!(matches!(result, Err(MetadataError::NotInitialized(_))));
        assert!(!called);
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_phases() {
        use std::thread;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .initialize(&RunMetadata::new(dir.path(), &identity()))
            .unwrap();

        let handles: Vec<_> = [ArtifactPhase::Backend, ArtifactPhase::Frontend, ArtifactPhase::Testing]
            .into_iter()
            .map(|phase| {
                let store = store.clone();
                thread::spawn(move || {
                    store.update(|m| m.record_phase(phase, stats(1))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().unwrap().artifacts.len(), 3);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .initialize(&RunMetadata::new(dir.path(), &identity()))
            .unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
