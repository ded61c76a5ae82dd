//! Migrate a Mezzio v2 application to v3
//!
//! # Usage
//!
//! ```bash
//! # Migrate the application in the current directory
//! mezzio-migration
//!
//! # Custom source directories, machine-readable report
//! mezzio-migration /srv/app --src src/App --handlers-src src/App/Handler --json
//!
//! # Override the rule tables and the composer binary
//! MEZZIO_MIGRATION_COMPOSER=/usr/local/bin/composer mezzio-migration --config migration.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use migration_engine::config::{MigrationConfig, ProjectSettings};
use migration_engine::error::MigrationError;
use migration_engine::fetcher::HttpSkeletonFetcher;
use migration_engine::gateway::ComposerGateway;
use migration_engine::manifest::ManifestStore;
use migration_engine::orchestrator::{MigrationOrchestrator, MigrationReport};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Application root (directory holding composer.json)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Directory scanned for http-interop middleware, relative to the root
    #[arg(long, default_value = "src")]
    src: PathBuf,

    /// Directory scanned for middleware convertible to request handlers
    #[arg(long, default_value = "src")]
    handlers_src: PathBuf,

    /// TOML file overriding the migration rule tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full report as JSON on stdout
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Debug-level logging unless RUST_LOG is set
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<MigrationConfig> {
    match path {
        Some(path) => {
            let mut config = MigrationConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            config.apply_env();
            Ok(config)
        }
        None => Ok(MigrationConfig::from_env()),
    }
}

/// Checks that abort before the migration starts
fn check_project(project: &ProjectSettings, config: &MigrationConfig) -> Result<()> {
    if !project.root.is_dir() {
        bail!("Given path {} is not a directory.", project.root.display());
    }
    let store = ManifestStore::open(project, &config.files);
    store.ensure_writable().context("Cannot migrate this project")?;
    tracing::debug!(manifest = %store.manifest_path().display(), "Manifest is writable");
    Ok(())
}

/// Recovery hint for a failure raised before the migration started
fn init_suggestion(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<MigrationError>()
        .and_then(MigrationError::recovery_suggestion)
}

fn print_report(report: &MigrationReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
        return Ok(());
    }

    for stage in &report.stages {
        println!("{}", stage.line());
    }
    println!("{}", report.summary());
    if let Some(error) = &report.error {
        eprintln!("Error: {error}");
    }
    if let Some(suggestion) = &report.suggestion {
        eprintln!("Suggestion: {suggestion}");
    }
    Ok(())
}

async fn run(args: Args) -> Result<bool> {
    let config = load_config(args.config.as_ref())?;
    let project = ProjectSettings {
        root: args.path,
        interop_src: args.src,
        handlers_src: args.handlers_src,
    };
    check_project(&project, &config)?;

    let gateway = ComposerGateway::new(&project.root, &config.composer);
    let fetcher = HttpSkeletonFetcher::new(&config.skeleton).context("Failed to create HTTP client")?;

    tracing::info!(
        root = %project.root.display(),
        src = %project.interop_src.display(),
        handlers_src = %project.handlers_src.display(),
        composer = %config.composer.binary,
        "Mezzio migration starting"
    );

    let report = MigrationOrchestrator::new(config, project, gateway, fetcher)
        .run()
        .await;
    print_report(&report, args.json)?;
    Ok(report.succeeded())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(suggestion) = init_suggestion(&e) {
                eprintln!("Suggestion: {suggestion}");
            }
            ExitCode::FAILURE
        }
    }
}
