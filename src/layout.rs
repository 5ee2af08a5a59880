//! Canonical on-disk layout of the artifact store
//!
//! ```text
//! artifacts/
//!   metadata.json
//!   .security-config.json
//!   .metadata.lock
//!   backend/   <category>/...  checksums.json  manifest.json
//!   frontend/  <category>/...  checksums.json  manifest.json
//!   testing/   <category>/...  security-scans/security-scan-results.json
//!   metadata/  audit-logs/artifact-report.{json,md}
//! ```

use std::path::{Component, Path, PathBuf};

use crate::phase::ArtifactPhase;

/// Name of the artifacts directory under the project root
pub const ARTIFACTS_DIR: &str = "artifacts";

pub const METADATA_FILE: &str = "metadata.json";
pub const SECURITY_CONFIG_FILE: &str = ".security-config.json";
pub const METADATA_LOCK_FILE: &str = ".metadata.lock";

pub const CHECKSUMS_FILE: &str = "checksums.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Files at a phase root that describe the phase rather than belong to it
pub const PHASE_BOOKKEEPING_FILES: &[&str] = &[CHECKSUMS_FILE, MANIFEST_FILE];

pub const SECURITY_SCAN_DIR: &str = "security-scans";
pub const SECURITY_RESULTS_FILE: &str = "security-scan-results.json";

pub const AUDIT_LOG_DIR: &str = "audit-logs";
pub const REPORT_JSON_FILE: &str = "artifact-report.json";
pub const REPORT_MARKDOWN_FILE: &str = "artifact-report.md";

/// Resolved paths for one project's artifact store
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    project_root: PathBuf,
    artifacts_root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let artifacts_root = project_root.join(ARTIFACTS_DIR);
        Self {
            project_root,
            artifacts_root,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// `artifacts/`
    pub fn root(&self) -> &Path {
        &self.artifacts_root
    }

    /// `artifacts/<phase>/`
    pub fn phase_root(&self, phase: ArtifactPhase) -> PathBuf {
        self.artifacts_root.join(phase.as_str())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.artifacts_root.join(METADATA_FILE)
    }

    pub fn security_config_path(&self) -> PathBuf {
        self.artifacts_root.join(SECURITY_CONFIG_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.artifacts_root.join(METADATA_LOCK_FILE)
    }

    pub fn checksums_path(&self, phase: ArtifactPhase) -> PathBuf {
        self.phase_root(phase).join(CHECKSUMS_FILE)
    }

    pub fn manifest_path(&self, phase: ArtifactPhase) -> PathBuf {
        self.phase_root(phase).join(MANIFEST_FILE)
    }

    pub fn security_scan_dir(&self) -> PathBuf {
        self.phase_root(ArtifactPhase::Testing).join(SECURITY_SCAN_DIR)
    }

    pub fn security_results_path(&self) -> PathBuf {
        self.security_scan_dir().join(SECURITY_RESULTS_FILE)
    }

    pub fn audit_log_dir(&self) -> PathBuf {
        self.phase_root(ArtifactPhase::Metadata).join(AUDIT_LOG_DIR)
    }

    pub fn report_json_path(&self) -> PathBuf {
        self.audit_log_dir().join(REPORT_JSON_FILE)
    }

    pub fn report_markdown_path(&self) -> PathBuf {
        self.audit_log_dir().join(REPORT_MARKDOWN_FILE)
    }

    /// Directories created by `init`
    pub fn skeleton_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.artifacts_root.clone()];
        dirs.extend(ArtifactPhase::ALL.iter().map(|p| self.phase_root(*p)));
        dirs.push(self.security_scan_dir());
        dirs.push(self.audit_log_dir());
        dirs
    }
}

/// `/`-separated path of `path` relative to `root`, or `None` if `path` is
/// not under `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Whether `key` names a bookkeeping file at the phase root itself
pub fn is_phase_bookkeeping(key: &str) -> bool {
    PHASE_BOOKKEEPING_FILES.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ArtifactLayout::new("/work/app");
        assert_eq!(layout.root(), Path::new("/work/app/artifacts"));
        assert_eq!(
            layout.checksums_path(ArtifactPhase::Backend),
            PathBuf::from("/work/app/artifacts/backend/checksums.json")
        );
        assert_eq!(
            layout.security_results_path(),
            PathBuf::from("/work/app/artifacts/testing/security-scans/security-scan-results.json")
        );
        assert_eq!(
            layout.report_json_path(),
            PathBuf::from("/work/app/artifacts/metadata/audit-logs/artifact-report.json")
        );
    }

    #[test]
    fn test_relative_key_uses_forward_slashes() {
        let root = Path::new("/a/b");
        let path = root.join("c").join("d.txt");
        assert_eq!(relative_key(root, &path).as_deref(), Some("c/d.txt"));
    }

    #[test]
    fn test_relative_key_outside_root() {
        assert_eq!(relative_key(Path::new("/a/b"), Path::new("/a/c/d")), None);
        assert_eq!(relative_key(Path::new("/a/b"), Path::new("/a/b")), None);
    }

    #[test]
    fn test_bookkeeping_only_at_phase_root() {
        assert!(is_phase_bookkeeping("manifest.json"));
        assert!(!is_phase_bookkeeping("build/manifest.json"));
    }

    #[test]
    fn test_skeleton_dirs() {
        let layout = ArtifactLayout::new("/p");
        let dirs = layout.skeleton_dirs();
        assert!(dirs.contains(&PathBuf::from("/p/artifacts/metadata/audit-logs")));
        assert!(dirs.contains(&PathBuf::from("/p/artifacts/testing/security-scans")));
        assert_eq!(dirs.len(), 7);
    }
}
