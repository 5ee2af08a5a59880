//! Built-in defaults (layer 1)

use serde_json::{json, Value};

/// Directory names never descended into while collecting
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &["node_modules", "cache", ".cache", ".git"];

/// Built-in configuration as a JSON value ready for merging.
///
/// Collection rules are keyed by source name; `collect:<name>` selects one.
pub fn builtin_value() -> Value {
    json!({
        "retention_days": 30,
        "compression": "none",
        "encryption": "none",
        "validation": true,
        "lock_timeout_seconds": 10,
        "verbose": false,
        "dry_run": false,
        "run": {
            "branch": "unknown",
            "commit_id": "unknown",
            "build_id": "unknown",
            "environment": "development"
        },
        "sources": {
            "migrations": {
                "phase": "backend",
                "category": "migrations",
                "sources": ["amplify/migrations", "migrations", "db/migrations"],
                "extensions": [".sql", ".js", ".ts", ".json"],
                "exclude_dirs": DEFAULT_EXCLUDE_DIRS
            },
            "backend": {
                "phase": "backend",
                "category": "infrastructure",
                "sources": ["amplify/backend", ".amplify/artifacts", "cdk.out"],
                "extensions": [".json", ".yml", ".yaml", ".ts", ".js", ".template"],
                "exclude_dirs": DEFAULT_EXCLUDE_DIRS
            },
            "frontend": {
                "phase": "frontend",
                "category": "build",
                "sources": [".next", "out", "dist"],
                "extensions": [".js", ".css", ".html", ".json", ".map", ".txt", ".svg", ".ico"],
                "exclude_dirs": DEFAULT_EXCLUDE_DIRS
            },
            "testing": {
                "phase": "testing",
                "category": "reports",
                "sources": ["coverage", "test-results", "playwright-report", "reports"],
                "extensions": [".xml", ".json", ".html", ".lcov", ".info", ".txt", ".log"],
                "exclude_dirs": DEFAULT_EXCLUDE_DIRS
            }
        }
    })
}
