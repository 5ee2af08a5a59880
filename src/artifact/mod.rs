//! Phase integrity documents
//!
//! `finalize` writes `checksums.json` and `manifest.json` for a phase and
//! records its counters in run metadata; `validate` checks a phase tree
//! against those documents.

mod checksums;
mod finalize;
mod manifest;
mod verify;

pub use checksums::{compute_sha256, sha256_file, ChecksumIndex};
pub use finalize::{
    enumerate_phase, finalize_phase, live_stats, FinalizeError, FinalizeOutcome, LiveStats,
    PhaseFile,
};
pub use manifest::{ManifestEntry, PhaseManifest};
pub use verify::{validate_phase, IntegrityError, ValidateError, ValidationSummary};
