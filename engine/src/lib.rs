//! Mezzio Migration Engine
//!
//! This library upgrades a Mezzio v2 application to v3 in place:
//! - Dependency Set Resolver: which packages to remove, add, reclassify
//!   and repin, including declared dependants of the packages that change
//! - Idempotent Configuration Patcher: wraps `config/pipeline.php` and
//!   `config/routes.php` into callables, rewrites legacy pipeline calls and
//!   inserts the method-not-allowed stage; rerunning is a no-op
//! - Migration Orchestrator: runs the stages in order, stops at the first
//!   hard failure and reports every stage's outcome
//!
//! # Collaborators
//!
//! - [`gateway::PackageManagerGateway`]: install/remove/require/update/why,
//!   implemented over `composer` by [`gateway::ComposerGateway`]
//! - [`fetcher::SkeletonFetcher`]: reference files from the skeleton
//!   release, implemented over HTTP by [`fetcher::HttpSkeletonFetcher`]
//!
//! # Usage
//!
//! ```no_run
//! use migration_engine::config::{MigrationConfig, ProjectSettings};
//! use migration_engine::fetcher::HttpSkeletonFetcher;
//! use migration_engine::gateway::ComposerGateway;
//! use migration_engine::orchestrator::MigrationOrchestrator;
//!
//! # async fn run() -> migration_engine::error::MigrationResult<()> {
//! let config = MigrationConfig::from_env();
//! let project = ProjectSettings::new("/srv/app");
//! let gateway = ComposerGateway::new(&project.root, &config.composer);
//! let fetcher = HttpSkeletonFetcher::new(&config.skeleton)?;
//!
//! let report = MigrationOrchestrator::new(config, project, gateway, fetcher).run().await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod manifest;
pub mod orchestrator;
pub mod patcher;
pub mod resolver;

pub use config::{MigrationConfig, ProjectSettings};
pub use error::{MigrationError, MigrationResult};
pub use orchestrator::{MigrationOrchestrator, MigrationReport, MigrationStage, StageOutcome};
