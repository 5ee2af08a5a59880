//! CLI task names (`collect:frontend`, `finalize:testing`, ...)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::phase::ArtifactPhase;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskParseError {
    #[error("unknown task '{0}'")]
    Unknown(String),

    #[error("'{task}' needs a target, e.g. '{task}:backend'")]
    MissingTarget { task: String },

    #[error("invalid phase '{phase}' for '{task}' (expected backend, frontend or testing)")]
    InvalidPhase { task: String, phase: String },
}

/// One invocation of the artifact manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Init,
    /// Collection rule name
    Collect(String),
    SecurityScan,
    Finalize(ArtifactPhase),
    Validate(ArtifactPhase),
    Download(ArtifactPhase),
    Report,
    Cleanup,
    /// Full init → collect → scan → finalize → validate → report run
    TestArtifacts,
}

impl Task {
    fn collected_phase(task: &str, target: &str) -> Result<ArtifactPhase, TaskParseError> {
        match target.parse::<ArtifactPhase>() {
            Ok(phase) if phase != ArtifactPhase::Metadata => Ok(phase),
            _ => Err(TaskParseError::InvalidPhase {
                task: task.to_string(),
                phase: target.to_string(),
            }),
        }
    }
}

impl FromStr for Task {
    type Err = TaskParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => return Ok(Task::Init),
            "security:scan" => return Ok(Task::SecurityScan),
            "report" => return Ok(Task::Report),
            "cleanup" => return Ok(Task::Cleanup),
            "test:artifacts" => return Ok(Task::TestArtifacts),
            _ => {}
        }

        let (task, target) = match s.split_once(':') {
            Some((task, target)) => (task, target),
            None if matches!(s, "collect" | "finalize" | "validate" | "download") => {
                return Err(TaskParseError::MissingTarget {
                    task: s.to_string(),
                })
            }
            None => return Err(TaskParseError::Unknown(s.to_string())),
        };
        if target.is_empty() {
            return Err(TaskParseError::MissingTarget {
                task: task.to_string(),
            });
        }

        match task {
            "collect" => Ok(Task::Collect(target.to_string())),
            "finalize" => Task::collected_phase(task, target).map(Task::Finalize),
            "validate" => Task::collected_phase(task, target).map(Task::Validate),
            "download" => Task::collected_phase(task, target).map(Task::Download),
            _ => Err(TaskParseError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Init => f.write_str("init"),
            Task::Collect(source) => write!(f, "collect:{}", source),
            Task::SecurityScan => f.write_str("security:scan"),
            Task::Finalize(phase) => write!(f, "finalize:{}", phase),
            Task::Validate(phase) => write!(f, "validate:{}", phase),
            Task::Download(phase) => write!(f, "download:{}", phase),
            Task::Report => f.write_str("report"),
            Task::Cleanup => f.write_str("cleanup"),
            Task::TestArtifacts => f.write_str("test:artifacts"),
        }
    }
}
