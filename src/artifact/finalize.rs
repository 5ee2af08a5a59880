//! Phase finalize: checksums, manifest and metadata counters
//!
//! One enumeration pass over `artifacts/<phase>/` feeds both documents so
//! they always describe the same set of files.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::checksums::{sha256_file, ChecksumIndex};
use super::manifest::{ManifestEntry, PhaseManifest};
use crate::layout::{is_phase_bookkeeping, relative_key, ArtifactLayout};
use crate::metadata::{MetadataError, MetadataStore, PhaseStats};
use crate::phase::ArtifactPhase;
use crate::scan::{scan, ScanError, ScanFilter};

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("phase directory {path} does not exist; nothing to finalize")]
    MissingPhase { path: PathBuf },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("file name is not valid UTF-8: {}", .path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// A file found under a phase root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFile {
    /// `/`-separated path relative to the phase root
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
}

/// File count and byte total of a phase tree as it is on disk now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    pub file_count: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub phase: ArtifactPhase,
    pub file_count: usize,
    pub total_size: u64,
    pub checksums_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Enumerate the files of a phase, skipping its own bookkeeping files.
///
/// `checksums.json` and `manifest.json` are skipped only at the phase root;
/// collected files with the same names deeper in the tree are kept.
pub fn enumerate_phase(
    layout: &ArtifactLayout,
    phase: ArtifactPhase,
    filter: &ScanFilter,
) -> Result<Vec<PhaseFile>, FinalizeError> {
    let root = layout.phase_root(phase);
    let mut files = Vec::new();

    for path in scan(&root, filter) {
        let path = path?;
        if path.strip_prefix(&root).is_ok_and(|rel| rel.to_str().is_none()) {
            return Err(FinalizeError::NonUtf8Path { path });
        }
        let Some(key) = relative_key(&root, &path) else {
            continue;
        };
        if is_phase_bookkeeping(&key) {
            continue;
        }

        let size = fs::metadata(&path)
            .map_err(|source| FinalizeError::Read {
                path: path.clone(),
                source,
            })?
            .len();
        files.push(PhaseFile { key, path, size });
    }

    Ok(files)
}

/// Live counters using the same enumeration as finalize.
///
/// Returns `None` when the phase directory does not exist.
pub fn live_stats(
    layout: &ArtifactLayout,
    phase: ArtifactPhase,
    filter: &ScanFilter,
) -> Result<Option<LiveStats>, FinalizeError> {
    if !layout.phase_root(phase).is_dir() {
        return Ok(None);
    }

    let files = enumerate_phase(layout, phase, filter)?;
    Ok(Some(LiveStats {
        file_count: files.len(),
        total_size: files.iter().map(|f| f.size).sum(),
    }))
}

/// Write `checksums.json` and `manifest.json` for `phase` and record its
/// counters in run metadata.
pub fn finalize_phase(
    layout: &ArtifactLayout,
    phase: ArtifactPhase,
    filter: &ScanFilter,
    store: &MetadataStore,
) -> Result<FinalizeOutcome, FinalizeError> {
    let root = layout.phase_root(phase);
    if !root.is_dir() {
        return Err(FinalizeError::MissingPhase { path: root });
    }

    let files = enumerate_phase(layout, phase, filter)?;

    let mut checksums = ChecksumIndex::new();
    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let digest = sha256_file(&file.path).map_err(|source| FinalizeError::Read {
            path: file.path.clone(),
            source,
        })?;
        debug!(phase = %phase, file = %file.key, sha256 = %digest, "checksummed");
        checksums.insert(file.key.clone(), digest);
        entries.push(ManifestEntry {
            path: file.key.clone(),
            size: file.size,
        });
    }

    let manifest = PhaseManifest::new(phase, entries);
    let total_size = manifest.total_size();

    let checksums_path = layout.checksums_path(phase);
    let manifest_path = layout.manifest_path(phase);

    // Documents are written only once metadata is loaded under the lock, and
    // removed again if the metadata write does not land.
    let mut documents_touched = false;
    let recorded = store.try_update(|metadata| -> Result<(), FinalizeError> {
        documents_touched = true;
        checksums
            .write_to_file(&checksums_path)
            .map_err(|source| FinalizeError::Write {
                path: checksums_path.clone(),
                source,
            })?;
        manifest
            .write_to_file(&manifest_path)
            .map_err(|source| FinalizeError::Write {
                path: manifest_path.clone(),
                source,
            })?;
        metadata.record_phase(
            phase,
            PhaseStats {
                count: manifest.file_count,
                total_size,
                last_updated: Utc::now(),
            },
        );
        Ok(())
    });
    if let Err(e) = recorded {
        if documents_touched {
            for path in [&checksums_path, &manifest_path] {
                if let Err(err) = fs::remove_file(path) {
                    if err.kind() != io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %err, "failed to remove partial finalize output");
                    }
                }
            }
        }
        return Err(e);
    }

    info!(
        phase = %phase,
        files = manifest.file_count,
        bytes = total_size,
        "phase finalized"
    );

    Ok(FinalizeOutcome {
        phase,
        file_count: manifest.file_count,
        total_size,
        checksums_path,
        manifest_path,
    })
}
