//! Pattern-based secret detection for collected build artifacts.
//!
//! A [`Detector`] is compiled once from a [`SecurityPolicy`] and then applied
//! to the text of each artifact. Detection only: nothing is redacted.

mod policy;

pub use policy::{
    default_patterns, PatternSpec, SecurityPolicy, Severity, DEFAULT_MAX_FILE_SIZE_BYTES,
    DEFAULT_TEXT_EXTENSIONS,
};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Errors raised while compiling a policy.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid pattern '{name}': {source}")]
    Invalid {
        name: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("policy has no patterns")]
    Empty,
}

/// One rule's matches within one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternHit {
    /// Rule name
    pub name: String,

    /// Pattern source, as configured
    pub pattern: String,

    /// Number of non-overlapping matches
    pub matches: usize,

    pub severity: Severity,
}

#[derive(Debug)]
struct CompiledPattern {
    spec: PatternSpec,
    regex: Regex,
}

/// Compiled, ordered rule set.
#[derive(Debug)]
pub struct Detector {
    patterns: Vec<CompiledPattern>,
}

impl Detector {
    /// Compile every pattern in the policy, failing on the first invalid one.
    pub fn compile(policy: &SecurityPolicy) -> Result<Self, PatternError> {
        if policy.patterns.is_empty() {
            return Err(PatternError::Empty);
        }

        let patterns = policy
            .patterns
            .iter()
            .map(|spec| {
                Regex::new(&spec.pattern)
                    .map(|regex| CompiledPattern {
                        spec: spec.clone(),
                        regex,
                    })
                    .map_err(|source| PatternError::Invalid {
                        name: spec.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Apply every rule to `text`, in policy order. Rules with no match are omitted.
    pub fn scan_text(&self, text: &str) -> Vec<PatternHit> {
        self.patterns
            .iter()
            .filter_map(|p| {
                let matches = p.regex.find_iter(text).count();
                (matches > 0).then(|| PatternHit {
                    name: p.spec.name.clone(),
                    pattern: p.spec.pattern.clone(),
                    matches,
                    severity: p.spec.severity,
                })
            })
            .collect()
    }
}
