//! Pipeline Artifacts - build artifact lifecycle manager
//!
//! Collects build-phase outputs into a canonical `artifacts/` tree, records
//! per-phase checksums and manifests, validates them on demand, scans the
//! store for leaked secrets and reports on the whole run.

pub mod artifact;
pub mod collect;
pub mod config;
pub mod layout;
pub mod metadata;
pub mod phase;
pub mod pipeline;
pub mod report;
pub mod retention;
pub mod scan;
pub mod security;
pub mod task;

pub use artifact::{
    finalize_phase, validate_phase, ChecksumIndex, IntegrityError, PhaseManifest, ValidateError,
};
pub use collect::{CollectionRule, Collector};
pub use config::{ArtifactConfig, EffectiveConfig};
pub use layout::ArtifactLayout;
pub use metadata::{MetadataStore, RunMetadata};
pub use phase::ArtifactPhase;
pub use pipeline::{ArtifactError, ArtifactManager, TaskOutcome};
pub use report::{ArtifactReport, ReportGenerator};
pub use security::{SecurityScanResult, SecurityScanner};
pub use task::Task;
