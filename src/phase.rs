//! Artifact phases
//!
//! Each phase owns an isolated subtree `artifacts/<phase>/`. A file belongs
//! to exactly one phase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Build phase that produced (or owns) a set of artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPhase {
    /// Backend infrastructure output and migrations
    Backend,
    /// Frontend bundle
    Frontend,
    /// Test reports and security scan results
    Testing,
    /// Run-level audit output (reports)
    Metadata,
}

impl ArtifactPhase {
    /// All phases in canonical order
    pub const ALL: [ArtifactPhase; 4] = [
        ArtifactPhase::Backend,
        ArtifactPhase::Frontend,
        ArtifactPhase::Testing,
        ArtifactPhase::Metadata,
    ];

    /// Directory name under the artifacts root (also the JSON key)
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactPhase::Backend => "backend",
            ArtifactPhase::Frontend => "frontend",
            ArtifactPhase::Testing => "testing",
            ArtifactPhase::Metadata => "metadata",
        }
    }
}

impl fmt::Display for ArtifactPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown artifact phase '{0}' (expected backend, frontend, testing or metadata)")]
pub struct PhaseParseError(pub String);

impl FromStr for ArtifactPhase {
    type Err = PhaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backend" => Ok(ArtifactPhase::Backend),
            "frontend" => Ok(ArtifactPhase::Frontend),
            "testing" => Ok(ArtifactPhase::Testing),
            "metadata" => Ok(ArtifactPhase::Metadata),
            other => Err(PhaseParseError(other.to_string())),
        }
    }
}
