//! Phase manifest (`<phase>/manifest.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::phase::ArtifactPhase;

/// One file in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative path within the phase root, `/`-separated
    pub path: String,

    /// Size in bytes
    pub size: u64,
}

/// File inventory of one phase at finalize time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseManifest {
    pub phase: ArtifactPhase,

    pub created: DateTime<Utc>,

    pub file_count: usize,

    /// Sorted by path
    pub files: Vec<ManifestEntry>,
}

impl PhaseManifest {
    pub fn new(phase: ArtifactPhase, mut files: Vec<ManifestEntry>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            phase,
            created: Utc::now(),
            file_count: files.len(),
            files,
        }
    }

    /// `fileCount` agrees with the number of entries
    pub fn is_consistent(&self) -> bool {
        self.file_count == self.files.len()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            size,
        }
    }

    #[test]
    fn test_new_sorts_and_counts() {
        let manifest = PhaseManifest::new(
            ArtifactPhase::Backend,
            vec![entry("z.json", 1), entry("a/b.sql", 2)],
        );
        assert_eq!(manifest.file_count, 2);
        assert_eq!(manifest.files[0].path, "a/b.sql");
        assert_eq!(manifest.total_size(), 3);
        assert!(manifest.is_consistent());
    }

    #[test]
    fn test_json_shape() {
        let manifest = PhaseManifest::new(ArtifactPhase::Testing, vec![entry("r.xml", 9)]);
        let value: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(value["phase"], "testing");
        assert_eq!(value["fileCount"], 1);
        assert_eq!(value["files"][0]["path"], "r.xml");
        assert_eq!(value["files"][0]["size"], 9);
        assert!(value["created"].is_string());
    }

    #[test]
    fn test_inconsistent_count_detected() {
        let mut manifest = PhaseManifest::new(ArtifactPhase::Frontend, vec![entry("a.js", 1)]);
        manifest.file_count = 5;
        let reparsed = PhaseManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert!(!reparsed.is_consistent());
    }
}
