//! Phase validation against `checksums.json` and `manifest.json`
//!
//! Read-only. Stops at the first integrity error.
//!
//! A checksum entry whose file no longer exists is skipped with a warning;
//! only manifest entries are required to be present.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::checksums::{sha256_file, ChecksumIndex};
use super::manifest::PhaseManifest;
use crate::layout::ArtifactLayout;
use crate::phase::ArtifactPhase;

/// A file that does not match what finalize recorded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("file listed in manifest is missing: {path}")]
    MissingFile { path: String },

    #[error("manifest fileCount {declared} does not match {actual} entries")]
    ManifestCountMismatch { declared: usize, actual: usize },

    #[error("recorded path is not inside the phase directory: {path}")]
    UnsafePath { path: String },
}

impl IntegrityError {
    /// Relative path of the offending file, if the error names one
    pub fn path(&self) -> Option<&str> {
        match self {
            IntegrityError::ChecksumMismatch { path, .. }
            | IntegrityError::MissingFile { path }
            | IntegrityError::UnsafePath { path } => Some(path),
            IntegrityError::ManifestCountMismatch { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("phase {phase} has never been finalized: {} is missing", .missing.display())]
    NotFinalized {
        phase: ArtifactPhase,
        missing: PathBuf,
    },

    #[error("integrity check failed for phase {phase}: {error}")]
    Integrity {
        phase: ArtifactPhase,
        #[source]
        error: IntegrityError,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ValidateError {
    pub fn integrity(&self) -> Option<&IntegrityError> {
        match self {
            ValidateError::Integrity { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Counts from a passing validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSummary {
    pub phase: ArtifactPhase,
    /// Checksum entries recomputed and matched
    pub verified: usize,
    /// Checksum entries whose file was absent
    pub skipped_missing: usize,
    pub manifest_entries: usize,
}

/// Validate `phase` against its finalize documents.
pub fn validate_phase(
    layout: &ArtifactLayout,
    phase: ArtifactPhase,
) -> Result<ValidationSummary, ValidateError> {
    let checksums_path = layout.checksums_path(phase);
    let manifest_path = layout.manifest_path(phase);

    for required in [&checksums_path, &manifest_path] {
        if !required.is_file() {
            return Err(ValidateError::NotFinalized {
                phase,
                missing: required.clone(),
            });
        }
    }

    let checksums = ChecksumIndex::from_file(&checksums_path).map_err(|source| {
        ValidateError::Io {
            path: checksums_path.clone(),
            source,
        }
    })?;
    let manifest = PhaseManifest::from_file(&manifest_path).map_err(|source| {
        ValidateError::Io {
            path: manifest_path.clone(),
            source,
        }
    })?;

    let fail = |error: IntegrityError| ValidateError::Integrity { phase, error };
    let root = layout.phase_root(phase);

    if !manifest.is_consistent() {
        return Err(fail(IntegrityError::ManifestCountMismatch {
            declared: manifest.file_count,
            actual: manifest.files.len(),
        }));
    }

    let recorded_keys = checksums
        .iter()
        .map(|(key, _)| key)
        .chain(manifest.files.iter().map(|entry| entry.path.as_str()));
    for key in recorded_keys {
        if !is_phase_relative(key) {
            return Err(fail(IntegrityError::UnsafePath {
                path: key.to_string(),
            }));
        }
    }

    let mut verified = 0;
    let mut skipped_missing = 0;
    for (key, expected) in checksums.iter() {
        let path = root.join(key);
        if !path.is_file() {
            warn!(phase = %phase, file = %key, "checksummed file is missing, skipping");
            skipped_missing += 1;
            continue;
        }

        let actual = sha256_file(&path).map_err(|source| ValidateError::Io {
            path: path.clone(),
            source,
        })?;
        if actual != expected {
            return Err(fail(IntegrityError::ChecksumMismatch {
                path: key.to_string(),
                expected: expected.to_string(),
                actual,
            }));
        }
        debug!(phase = %phase, file = %key, "checksum ok");
        verified += 1;
    }

    for entry in &manifest.files {
        if !root.join(&entry.path).is_file() {
            return Err(fail(IntegrityError::MissingFile {
                path: entry.path.clone(),
            }));
        }
    }

    info!(
        phase = %phase,
        verified,
        skipped_missing,
        "phase validated"
    );

    Ok(ValidationSummary {
        phase,
        verified,
        skipped_missing,
        manifest_entries: manifest.files.len(),
    })
}

/// Relative path made only of plain components (no `..`, root or prefix)
fn is_phase_relative(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::manifest::ManifestEntry;
    use crate::artifact::compute_sha256;
    use std::fs;
    use tempfile::TempDir;

    /// Phase tree with two files and matching finalize documents
    fn finalized(phase: ArtifactPhase) -> (TempDir, ArtifactLayout) {
        let dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let root = layout.phase_root(phase);
        fs::create_dir_all(root.join("reports")).unwrap();

        let files = [("reports/junit.xml", "<testsuite/>"), ("reports/lcov.info", "TN:")];
        let mut checksums = ChecksumIndex::new();
        let mut entries = Vec::new();
        for (key, content) in files {
            fs::write(root.join(key), content).unwrap();
            checksums.insert(key.to_string(), compute_sha256(content.as_bytes()));
            entries.push(ManifestEntry {
                path: key.to_string(),
                size: content.len() as u64,
            });
        }
        checksums.write_to_file(&layout.checksums_path(phase)).unwrap();
        PhaseManifest::new(phase, entries)
            .write_to_file(&layout.manifest_path(phase))
            .unwrap();

        (dir, layout)
    }

    #[test]
    fn test_untouched_phase_validates() {
        let (_dir, layout) = finalized(ArtifactPhase::Testing);
        let summary = validate_phase(&layout, ArtifactPhase::Testing).unwrap();
        assert_eq!(summary.verified, 2);
        assert_eq!(summary.skipped_missing, 0);
        assert_eq!(summary.manifest_entries, 2);
    }

    #[test]
    fn test_tampered_file_is_named() {
        let (_dir, layout) = finalized(ArtifactPhase::Testing);
        let root = layout.phase_root(ArtifactPhase::Testing);
        fs::write(root.join("reports/lcov.info"), "TN:changed").unwrap();

        let err = validate_phase(&layout, ArtifactPhase::Testing).unwrap_err();
        let integrity = err.integrity().unwrap();
        assert!(matches!(integrity, IntegrityError::ChecksumMismatch { .. }));
        assert_eq!(integrity.path(), Some("reports/lcov.info"));
        assert!(err.to_string().contains("reports/lcov.info"));
    }

    #[test]
    fn test_deleted_file_is_named() {
        let (_dir, layout) = finalized(ArtifactPhase::Testing);
        let root = layout.phase_root(ArtifactPhase::Testing);
        fs::remove_file(root.join("reports/junit.xml")).unwrap();

        let err = validate_phase(&layout, ArtifactPhase::Testing).unwrap_err();
        assert_eq!(
            err.integrity(),
            Some(&IntegrityError::MissingFile {
                path: "reports/junit.xml".to_string()
            })
        );
    }

    #[test]
    fn test_missing_checksummed_file_not_in_manifest_is_skipped() {
        let (_dir, layout) = finalized(ArtifactPhase::Backend);
        let mut checksums =
            ChecksumIndex::from_file(&layout.checksums_path(ArtifactPhase::Backend)).unwrap();
        checksums.insert("reports/gone.xml".to_string(), compute_sha256(b"gone"));
        checksums
            .write_to_file(&layout.checksums_path(ArtifactPhase::Backend))
            .unwrap();

        let summary = validate_phase(&layout, ArtifactPhase::Backend).unwrap();
        assert_eq!(summary.verified, 2);
        assert_eq!(summary.skipped_missing, 1);
    }

    #[test]
    fn test_never_finalized() {
        let dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(dir.path());
        let err = validate_phase(&layout, ArtifactPhase::Frontend).unwrap_err();
        assert!(matches!(err, ValidateError::NotFinalized { .. }));
        assert!(err.to_string().contains("checksums.json"));
    }

    #[test]
    fn test_manifest_count_mismatch() {
        let (_dir, layout) = finalized(ArtifactPhase::Testing);
        let path = layout.manifest_path(ArtifactPhase::Testing);
        let mut manifest = PhaseManifest::from_file(&path).unwrap();
        manifest.file_count = 3;
        manifest.write_to_file(&path).unwrap();

        let err = validate_phase(&layout, ArtifactPhase::Testing).unwrap_err();
        assert!(matches!(
            err.integrity(),
            Some(IntegrityError::ManifestCountMismatch {
                declared: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_key_escaping_phase_root_is_rejected() {
        let (dir, layout) = finalized(ArtifactPhase::Testing);
        fs::write(dir.path().join("outside.txt"), "secret").unwrap();
        let path = layout.checksums_path(ArtifactPhase::Testing);
        let mut checksums = ChecksumIndex::from_file(&path).unwrap();
        checksums.insert("../../outside.txt".to_string(), compute_sha256(b"secret"));
        checksums.write_to_file(&path).unwrap();

        let err = validate_phase(&layout, ArtifactPhase::Testing).unwrap_err();
        assert_eq!(
            err.integrity(),
            Some(&IntegrityError::UnsafePath {
                path: "../../outside.txt".to_string()
            })
        );
    }

    #[test]
    fn test_absolute_manifest_entry_is_rejected() {
        let (_dir, layout) = finalized(ArtifactPhase::Testing);
        let path = layout.manifest_path(ArtifactPhase::Testing);
        let mut manifest = PhaseManifest::from_file(&path).unwrap();
        manifest.files[0].path = "/etc/hosts".to_string();
        manifest.write_to_file(&path).unwrap();

        let err = validate_phase(&layout, ArtifactPhase::Testing).unwrap_err();
        assert!(matches!(
            err.integrity(),
            Some(IntegrityError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_phase_relative_keys() {
        assert!(is_phase_relative("reports/junit.xml"));
        assert!(!is_phase_relative("../junit.xml"));
        assert!(!is_phase_relative("reports/../../x"));
        assert!(!is_phase_relative("./junit.xml"));
        assert!(!is_phase_relative(""));
    }

    #[test]
    fn test_validation_is_read_only() {
        let (_dir, layout) = finalized(ArtifactPhase::Testing);
        let before = fs::read(layout.checksums_path(ArtifactPhase::Testing)).unwrap();
        validate_phase(&layout, ArtifactPhase::Testing).unwrap();
        let after = fs::read(layout.checksums_path(ArtifactPhase::Testing)).unwrap();
        assert_eq!(before, after);
    }
}
