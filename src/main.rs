//! Artifact manager CLI
//!
//! Entry point for the `artifact-manager` command-line tool.

use clap::Parser;
use pipeline_artifacts::{ArtifactLayout, ArtifactManager, EffectiveConfig, Task};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "artifact-manager")]
#[command(about = "Collect, checksum, validate and report build artifacts", version)]
struct Cli {
    /// Task to run: init, collect:<source>, security:scan, finalize:<phase>,
    /// validate:<phase>, download:<phase>, report, cleanup, test:artifacts
    task: Task,

    /// Log every copied file and checksum
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Report what would be copied or deleted without writing
    #[arg(long)]
    dry_run: bool,

    /// Project root containing the build outputs and `artifacts/`
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (default: <root>/artifacts.toml when present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output in JSON format where the task has a JSON form
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,pipeline_artifacts=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config layer for the flags that were actually passed
fn cli_overrides(cli: &Cli) -> Option<Value> {
    let mut overrides = Map::new();
    if cli.verbose {
        overrides.insert("verbose".to_string(), json!(true));
    }
    if cli.dry_run {
        overrides.insert("dry_run".to_string(), json!(true));
    }
    (!overrides.is_empty()).then(|| Value::Object(overrides))
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = cli_overrides(&cli);
    let effective = match EffectiveConfig::load(&cli.root, cli.config.as_deref(), overrides) {
        Ok(e) => e,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    for source in &effective.sources {
        debug!(origin = ?source.origin, path = ?source.path, "config layer");
    }

    let manager = ArtifactManager::new(ArtifactLayout::new(&cli.root), effective.config);
    let outcome = match manager.execute(&cli.task) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(task = %cli.task, "{}", e);
            process::exit(e.exit_code());
        }
    };

    match outcome.to_json() {
        Some(Ok(json)) if cli.json => println!("{}", json),
        Some(Err(e)) if cli.json => {
            error!("failed to serialize output: {}", e);
            process::exit(1);
        }
        _ => println!("{}", outcome.to_human()),
    }
}
