//! Filesystem scanner
//!
//! Depth-first enumeration of the files under a root, filtered by extension
//! and pruned by directory name. The sequence is lazy and every call walks
//! the tree afresh.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Errors surfaced while walking a tree
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// File selection rules for a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilter {
    /// Allowed extensions, leading dot included (".json"); case-sensitive
    pub extensions: Vec<String>,

    /// Directory names pruned anywhere below the root
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
}

impl ScanFilter {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.as_ref().to_string()).collect(),
            exclude_dirs: Vec::new(),
        }
    }

    pub fn with_exclude_dirs<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.exclude_dirs
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    /// Whether a file path passes the extension filter
    pub fn matches_file(&self, path: &Path) -> bool {
        match dotted_extension(path) {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    /// Whether a directory with this name is pruned
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude_dirs.iter().any(|d| d == name)
    }

    /// Merge another filter into this one, keeping entries unique
    pub fn union(mut self, other: &ScanFilter) -> Self {
        for ext in &other.extensions {
            if !self.extensions.contains(ext) {
                self.extensions.push(ext.clone());
            }
        }
        for dir in &other.exclude_dirs {
            if !self.exclude_dirs.contains(dir) {
                self.exclude_dirs.push(dir.clone());
            }
        }
        self
    }
}

/// Extension of `path` with its leading dot (`"a/b.tar.gz"` -> `".gz"`)
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

/// Enumerate files under `root` that pass `filter`.
///
/// A missing root yields an empty sequence. Symlinks are not followed and
/// siblings are visited in file-name order, so the sequence is deterministic.
pub fn scan(
    root: &Path,
    filter: &ScanFilter,
) -> impl Iterator<Item = Result<PathBuf, ScanError>> {
    let prune = filter.clone();
    let select = filter.clone();

    let walker = root.exists().then(|| {
        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && prune.is_excluded_dir(&entry.file_name().to_string_lossy()))
            })
    });

    walker
        .into_iter()
        .flatten()
        .filter_map(move |entry| match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && select.matches_file(entry.path()) {
                    Some(Ok(entry.into_path()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(ScanError::Walk(e))),
        })
}
