//! Test fixtures for artifact lifecycle tests
//!
//! Builds a throwaway project tree shaped like an Amplify + Next.js app after
//! a CI build: backend stack outputs, migrations, a `.next` build directory
//! and test reports.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use pipeline_artifacts::{ArtifactConfig, ArtifactLayout, ArtifactManager, EffectiveConfig};
use tempfile::TempDir;

/// Frontend file carrying a hard-coded credential
pub const LEAKY_FRONTEND_FILE: &str = ".next/server/config.js";

/// Write `content` at `rel` under `root`, creating parents
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Project with three collectable files per phase plus files every rule
/// must ignore.
pub fn sample_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    // backend
    write_file(root, "migrations/001_init.sql", "CREATE TABLE users (id INT);\n");
    write_file(root, "amplify/backend/api/schema.json", "{\"types\": [\"User\"]}");
    write_file(
        root,
        "amplify/backend/awscloudformation/stack.yml",
        "Resources:\n  Table:\n    Type: AWS::DynamoDB::Table\n",
    );
    write_file(root, "amplify/backend/node_modules/dep/index.js", "module.exports = 1;");

    // frontend
    write_file(root, ".next/static/chunks/main.js", "console.log('main');");
    write_file(root, ".next/static/css/app.css", "body { margin: 0; }");
    write_file(
        root,
        LEAKY_FRONTEND_FILE,
        "module.exports = { password = \"supersecret123\" };\n",
    );
    write_file(root, ".next/cache/webpack/stale.js", "stale");
    write_file(root, ".next/BUILD_ID", "abc123");

    // testing
    write_file(root, "coverage/lcov.info", "TN:\nSF:src/app.ts\nend_of_record\n");
    write_file(root, "coverage/lcov-report/index.html", "<html></html>");
    write_file(root, "test-results/junit.xml", "<testsuite tests=\"3\" failures=\"0\"/>");

    dir
}

/// Config with the given environment variables applied
pub fn config_with_env(root: &Path, env: &[(&str, &str)]) -> ArtifactConfig {
    let pairs: Vec<(String, String)> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EffectiveConfig::build(
        root,
        None,
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        },
        None,
    )
    .unwrap()
    .config
}

pub fn manager(root: &Path) -> ArtifactManager {
    ArtifactManager::new(ArtifactLayout::new(root), config_with_env(root, &[]))
}

pub fn dry_run_manager(root: &Path) -> ArtifactManager {
    let mut config = config_with_env(root, &[]);
    config.dry_run = true;
    ArtifactManager::new(ArtifactLayout::new(root), config)
}
