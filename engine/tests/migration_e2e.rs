//! End-to-end migration runs against a temporary project.
//!
//! The package manager and skeleton source are replaced by fakes that
//! record every call, so these tests check the exact command sequence and
//! the files left on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use migration_engine::config::{MigrationConfig, ProjectSettings};
use migration_engine::error::MigrationResult;
use migration_engine::fetcher::SkeletonFetcher;
use migration_engine::gateway::{CommandOutput, PackageManagerGateway};
use migration_engine::manifest::Classification;
use migration_engine::orchestrator::{MigrationOrchestrator, MigrationReport, MigrationStage, StageOutcome};
use serde_json::{json, Value};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct RecordingGateway {
    root: PathBuf,
    calls: Mutex<Vec<String>>,
    /// Commands starting with this exit non-zero
    fail_on: Option<String>,
    why: HashMap<String, Vec<String>>,
    /// Created under vendor/bin by `install`
    binaries: Vec<&'static str>,
    script_exit: i32,
}

impl RecordingGateway {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            fail_on: None,
            why: HashMap::new(),
            binaries: Vec::new(),
            script_exit: 0,
        }
    }

    fn why(mut self, name: &str, dependants: &[&str]) -> Self {
        self.why
            .insert(name.to_string(), dependants.iter().map(|s| s.to_string()).collect());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than the concurrent `why` queries, in order
    fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("why "))
            .collect()
    }

    fn record(&self, command: String) -> MigrationResult<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let failed = self
            .fail_on
            .as_deref()
            .is_some_and(|prefix| command.starts_with(prefix));
        Ok(CommandOutput {
            command: format!("composer {command}"),
            exit_code: Some(if failed { 2 } else { 0 }),
            stdout: String::new(),
            stderr: if failed { "Your requirements could not be resolved".to_string() } else { String::new() },
        })
    }
}

#[async_trait]
impl PackageManagerGateway for RecordingGateway {
    async fn install(&self) -> MigrationResult<CommandOutput> {
        let bin = self.root.join("vendor/bin");
        fs::create_dir_all(&bin)?;
        for binary in &self.binaries {
            fs::write(bin.join(binary), "#!/bin/sh\n")?;
        }
        self.record("install".to_string())
    }

    async fn remove(&self, names: &[String], dev: bool) -> MigrationResult<CommandOutput> {
        let flag = if dev { "--dev " } else { "" };
        self.record(format!("remove {flag}{}", names.join(" ")))
    }

    async fn require(&self, names: &[String], dev: bool) -> MigrationResult<CommandOutput> {
        let flag = if dev { "--dev " } else { "" };
        self.record(format!("require {flag}{}", names.join(" ")))
    }

    async fn update(&self) -> MigrationResult<CommandOutput> {
        self.record("update".to_string())
    }

    async fn why_depends_on(&self, name: &str) -> MigrationResult<Vec<String>> {
        self.calls.lock().unwrap().push(format!("why {name}"));
        Ok(self.why.get(name).cloned().unwrap_or_default())
    }

    async fn run_script(&self, script: &str, args: &[String]) -> MigrationResult<CommandOutput> {
        let mut command = format!("run {script}");
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        self.calls.lock().unwrap().push(command.clone());
        Ok(CommandOutput {
            command: format!("composer {command}"),
            exit_code: Some(self.script_exit),
            stdout: "converted 2 files".to_string(),
            stderr: String::new(),
        })
    }
}

#[derive(Default)]
struct FakeSkeleton {
    resolves: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

fn skeleton_content(path: &str) -> String {
    format!("<?php // skeleton 3.1.0: {path}\n")
}

#[async_trait]
impl SkeletonFetcher for FakeSkeleton {
    async fn resolve_latest_version_tag(&self, _pattern: &str) -> MigrationResult<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok("3.1.0".to_string())
    }

    async fn fetch_reference_file(&self, tag: &str, path: &str) -> MigrationResult<String> {
        assert_eq!(tag, "3.1.0");
        self.fetched.lock().unwrap().push(path.to_string());
        Ok(skeleton_content(path))
    }
}

// ---------------------------------------------------------------------------
// Project fixture
// ---------------------------------------------------------------------------

const PIPELINE: &str = "<?php\n\nuse Mezzio\\Middleware\\NotFoundHandler;\n\n$app->pipe(ErrorHandler::class);\n$app->pipeRoutingMiddleware();\n$app->pipe(ImplicitHeadMiddleware::class);\n$app->pipeDispatchMiddleware();\n$app->pipe(NotFoundHandler::class);\n";
const ROUTES: &str = "<?php\n\n$app->get('/', App\\Handler\\HomePageHandler::class, 'home');\n";
const INDEX: &str = "<?php\n// v2 front controller\n";
const CONTAINER: &str = "<?php\n// v2 container\n";

fn project(manifest: Value, framework_version: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("public")).unwrap();
    fs::create_dir_all(root.join("src/App")).unwrap();
    fs::create_dir_all(root.join("vendor/mezzio")).unwrap();

    fs::write(root.join("composer.json"), serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    let lock = json!({
        "packages": [
            { "name": "laminas/laminas-diactoros", "version": "1.8.6" },
            { "name": "mezzio/mezzio", "version": framework_version },
            { "name": "mezzio/mezzio-fastroute", "version": "2.2.0" },
            { "name": "mezzio/mezzio-router", "version": "2.4.1" },
            { "name": "psr/container", "version": "1.0.0" }
        ],
        "packages-dev": [
            { "name": "phpunit/phpunit", "version": "7.5.1" }
        ]
    });
    fs::write(root.join("composer.lock"), lock.to_string()).unwrap();
    fs::write(root.join("config/pipeline.php"), PIPELINE).unwrap();
    fs::write(root.join("config/routes.php"), ROUTES).unwrap();
    fs::write(root.join("public/index.php"), INDEX).unwrap();
    fs::write(root.join("config/container.php"), CONTAINER).unwrap();
    dir
}

fn standard_manifest() -> Value {
    json!({
        "name": "acme/app",
        "type": "project",
        "require": {
            "php": "^7.1",
            "acme/router-bridge": "^1.0",
            "laminas/laminas-component-installer": "^1.0",
            "mezzio/mezzio": "^2.0",
            "mezzio/mezzio-fastroute": "^2.0"
        },
        "require-dev": {
            "phpunit/phpunit": "^7.0"
        },
        "config": {
            "platform": { "php": "5.6.40" }
        }
    })
}

async fn migrate(
    dir: &TempDir,
    gateway: RecordingGateway,
) -> (MigrationReport, MigrationOrchestrator<RecordingGateway, FakeSkeleton>) {
    let orchestrator = MigrationOrchestrator::new(
        MigrationConfig::default(),
        ProjectSettings::new(dir.path()),
        gateway,
        FakeSkeleton::default(),
    );
    let report = orchestrator.run().await;
    (report, orchestrator)
}

fn read(dir: &TempDir, path: &str) -> String {
    fs::read_to_string(dir.path().join(path)).unwrap()
}

fn snapshot(dir: &TempDir) -> Vec<(String, Vec<u8>)> {
    [
        "composer.json",
        "composer.lock",
        "config/pipeline.php",
        "config/routes.php",
        "config/container.php",
        "public/index.php",
    ]
    .iter()
    .map(|p| (p.to_string(), fs::read(dir.path().join(p)).unwrap()))
    .collect()
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_migration() {
    let dir = project(standard_manifest(), "2.2.0");
    let mut gateway = RecordingGateway::new(dir.path())
        .why("mezzio/mezzio", &["acme/app"])
        .why(
            "mezzio/mezzio-router",
            &["mezzio/mezzio", "mezzio/mezzio-fastroute", "acme/router-bridge"],
        );
    gateway.binaries = vec!["phpcs", "phpcbf"];

    let (report, orchestrator) = migrate(&dir, gateway).await;
    assert!(report.succeeded(), "{}", report.summary());
    assert_eq!(report.detected_version.as_deref(), Some("2.2.0"));
    assert_eq!(report.stages.len(), MigrationStage::PIPELINE.len());
    assert_eq!(report.outcome(MigrationStage::RemoveObsolete), Some(StageOutcome::Skipped));
    assert_eq!(report.outcome(MigrationStage::ConditionalContainerSwap), Some(StageOutcome::Skipped));
    assert_eq!(report.outcome(MigrationStage::PatchPipeline), Some(StageOutcome::Done));
    assert_eq!(report.outcome(MigrationStage::AutoFixStyle), Some(StageOutcome::Done));

    let gateway = orchestrator.gateway();
    assert_eq!(
        gateway.commands(),
        vec![
            "remove mezzio/mezzio-migration",
            "install",
            "remove --dev acme/router-bridge laminas/laminas-diactoros mezzio/mezzio mezzio/mezzio-fastroute mezzio/mezzio-tooling",
            "remove acme/router-bridge laminas/laminas-diactoros mezzio/mezzio mezzio/mezzio-fastroute mezzio/mezzio-tooling",
            "update",
            "require laminas/laminas-diactoros mezzio/mezzio mezzio/mezzio-fastroute",
            "require --dev laminas/laminas-component-installer mezzio/mezzio-tooling",
            "require acme/router-bridge",
            "run mezzio migrate:interop-middleware --src src",
            "run mezzio migrate:middleware-to-request-handler --src src",
            "run cs-fix",
        ]
    );

    let mut queried: Vec<String> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("why "))
        .collect();
    queried.sort();
    assert_eq!(
        queried,
        vec![
            "why laminas/laminas-diactoros",
            "why mezzio/mezzio",
            "why mezzio/mezzio-fastroute",
            "why mezzio/mezzio-router",
        ]
    );

    let packages = report.packages.as_ref().unwrap();
    assert_eq!(
        packages.to_add["laminas/laminas-diactoros"].classification,
        Classification::Runtime
    );
    assert!(packages.reclassify.contains_key("laminas/laminas-component-installer"));

    let manifest: Value = serde_json::from_str(&read(&dir, "composer.json")).unwrap();
    assert_eq!(manifest["config"]["sort-packages"], json!(true));
    assert_eq!(manifest["config"]["platform"]["php"], json!("7.1.3"));
    assert_eq!(manifest["scripts"]["mezzio"], json!("mezzio"));
    assert_eq!(manifest["scripts"]["cs-check"], json!("phpcs"));
    assert_eq!(manifest["scripts"]["cs-fix"], json!("phpcbf"));

    let pipeline = read(&dir, "config/pipeline.php");
    assert!(pipeline.contains("declare(strict_types=1);"));
    assert!(pipeline.contains("use Mezzio\\Handler\\NotFoundHandler;"));
    assert!(pipeline.contains(
        "$app->pipe(\\Mezzio\\Router\\Middleware\\DispatchMiddleware::class);\n$app->pipe(\\Mezzio\\Router\\Middleware\\MethodNotAllowedMiddleware::class);\n"
    ));
    assert!(pipeline.ends_with("};\n"));

    let routes = read(&dir, "config/routes.php");
    assert!(routes.contains("return function ("));
    assert!(!routes.contains("MethodNotAllowedMiddleware"));

    assert_eq!(read(&dir, "public/index.php"), skeleton_content("public/index.php"));
    assert_eq!(read(&dir, "config/container.php"), CONTAINER);
    assert_eq!(orchestrator.skeleton().fetcher().resolves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rerun_leaves_wrapped_files_untouched() {
    let dir = project(standard_manifest(), "2.2.0");
    let (first, _) = migrate(&dir, RecordingGateway::new(dir.path())).await;
    assert!(first.succeeded(), "{}", first.summary());

    let pipeline = fs::read(dir.path().join("config/pipeline.php")).unwrap();
    let routes = fs::read(dir.path().join("config/routes.php")).unwrap();

    let (second, _) = migrate(&dir, RecordingGateway::new(dir.path())).await;
    assert!(second.succeeded(), "{}", second.summary());
    assert_eq!(second.outcome(MigrationStage::PatchPipeline), Some(StageOutcome::Skipped));
    assert_eq!(second.outcome(MigrationStage::PatchRoutes), Some(StageOutcome::Skipped));
    assert_eq!(fs::read(dir.path().join("config/pipeline.php")).unwrap(), pipeline);
    assert_eq!(fs::read(dir.path().join("config/routes.php")).unwrap(), routes);
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unsupported_version_touches_nothing() {
    let dir = project(standard_manifest(), "3.0.2");
    let before = snapshot(&dir);

    let (report, orchestrator) = migrate(&dir, RecordingGateway::new(dir.path())).await;

    assert!(!report.succeeded());
    assert_eq!(report.final_stage, MigrationStage::Failed);
    assert_eq!(report.first_failure, Some(MigrationStage::Validate));
    assert_eq!(report.error_code.as_deref(), Some("UNSUPPORTED_VERSION"));
    assert_eq!(report.stages.len(), 1);
    assert!(orchestrator.gateway().calls().is_empty());
    assert_eq!(snapshot(&dir), before);
    assert!(dir.path().join("vendor/mezzio").is_dir());
}

#[tokio::test]
async fn test_missing_framework_is_precondition() {
    let dir = project(
        json!({ "name": "acme/app", "require": { "laminas/laminas-diactoros": "^1.7" } }),
        "2.2.0",
    );
    let (report, orchestrator) = migrate(&dir, RecordingGateway::new(dir.path())).await;

    assert_eq!(report.error_code.as_deref(), Some("PRECONDITION_NOT_MET"));
    assert!(report.error.as_deref().unwrap().contains("mezzio/mezzio"));
    assert!(report.suggestion.is_some());
    assert!(orchestrator.gateway().calls().is_empty());
}

#[tokio::test]
async fn test_missing_source_directory_is_precondition() {
    let dir = project(standard_manifest(), "2.2.0");
    fs::remove_dir_all(dir.path().join("src")).unwrap();

    let (report, _) = migrate(&dir, RecordingGateway::new(dir.path())).await;
    assert_eq!(report.first_failure, Some(MigrationStage::Validate));
    assert_eq!(report.error_code.as_deref(), Some("PRECONDITION_NOT_MET"));
}

// ---------------------------------------------------------------------------
// Substitutions and container swap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pimple_project_gets_pimple_container() {
    let dir = project(
        json!({
            "name": "acme/app",
            "require": {
                "mezzio/mezzio": "^2.0",
                "pimple/pimple": "^3.2",
                "xtreamwayz/pimple-container-interop": "^1.0"
            }
        }),
        "2.1.0",
    );
    let (report, orchestrator) = migrate(&dir, RecordingGateway::new(dir.path())).await;
    assert!(report.succeeded(), "{}", report.summary());

    let commands = orchestrator.gateway().commands();
    assert_eq!(commands[0], "remove pimple/pimple xtreamwayz/pimple-container-interop");
    assert!(commands.contains(
        &"require laminas/laminas-diactoros laminas/laminas-pimple-config mezzio/mezzio".to_string()
    ));

    let container_path = "src/MezzioInstaller/Resources/config/container-pimple.php";
    assert_eq!(read(&dir, "config/container.php"), skeleton_content(container_path));
    assert_eq!(
        report.outcome(MigrationStage::ConditionalContainerSwap),
        Some(StageOutcome::Done)
    );

    let packages = report.packages.unwrap();
    assert!(packages.to_remove.contains("pimple/pimple"));
    assert!(packages.to_remove.contains("xtreamwayz/pimple-container-interop"));
}

// ---------------------------------------------------------------------------
// Failures mid-pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_package_manager_failure_halts_pipeline() {
    let dir = project(standard_manifest(), "2.2.0");
    let mut gateway = RecordingGateway::new(dir.path());
    gateway.fail_on = Some("update".to_string());

    let (report, orchestrator) = migrate(&dir, gateway).await;

    assert_eq!(report.final_stage, MigrationStage::Failed);
    assert_eq!(report.first_failure, Some(MigrationStage::ReconcilePackages));
    assert_eq!(report.error_code.as_deref(), Some("EXTERNAL_TOOL_FAILURE"));
    assert!(report.error.as_deref().unwrap().contains("composer update"));
    assert_eq!(report.stages.len(), 4);

    let commands = orchestrator.gateway().commands();
    assert_eq!(commands.last().map(String::as_str), Some("update"));
    assert!(!commands.iter().any(|c| c.starts_with("require")));

    // Housekeeping already happened and is not rolled back
    let manifest: Value = serde_json::from_str(&read(&dir, "composer.json")).unwrap();
    assert_eq!(manifest["config"]["sort-packages"], json!(true));
    assert_eq!(read(&dir, "config/pipeline.php"), PIPELINE);
}

#[tokio::test]
async fn test_unrecognized_pipeline_halts_before_routes() {
    let dir = project(standard_manifest(), "2.2.0");
    let pipeline = "<?php\n\n$app->pipe(ErrorHandler::class);\n$app->pipe(NotFoundHandler::class);\n";
    fs::write(dir.path().join("config/pipeline.php"), pipeline).unwrap();

    let (report, _) = migrate(&dir, RecordingGateway::new(dir.path())).await;

    assert_eq!(report.first_failure, Some(MigrationStage::PatchPipeline));
    assert_eq!(report.error_code.as_deref(), Some("NO_ANCHOR_FOUND"));
    assert_eq!(read(&dir, "config/pipeline.php"), pipeline);
    assert_eq!(read(&dir, "config/routes.php"), ROUTES);
    assert!(report.outcome(MigrationStage::PatchRoutes).is_none());
}

#[tokio::test]
async fn test_pipeline_without_app_statements_halts() {
    let dir = project(standard_manifest(), "2.2.0");
    let pipeline = "<?php\n$application->pipeRoutingMiddleware();\n$application->pipeDispatchMiddleware();\n";
    fs::write(dir.path().join("config/pipeline.php"), pipeline).unwrap();

    let (report, _) = migrate(&dir, RecordingGateway::new(dir.path())).await;

    assert!(!report.succeeded());
    assert_eq!(report.first_failure, Some(MigrationStage::PatchPipeline));
    assert_eq!(report.error_code.as_deref(), Some("NO_ANCHOR_FOUND"));
    assert_eq!(read(&dir, "config/pipeline.php"), pipeline);
    assert_eq!(read(&dir, "public/index.php"), INDEX);
    assert!(report.outcome(MigrationStage::ReplaceEntryPoint).is_none());
}

#[tokio::test]
async fn test_delegated_conversion_failure_is_warning() {
    let dir = project(standard_manifest(), "2.2.0");
    let mut gateway = RecordingGateway::new(dir.path());
    gateway.script_exit = 1;

    let (report, _) = migrate(&dir, gateway).await;

    assert!(report.succeeded(), "{}", report.summary());
    assert_eq!(
        report.outcome(MigrationStage::DelegateInteropMigration),
        Some(StageOutcome::Warning)
    );
    assert_eq!(
        report.outcome(MigrationStage::DelegateHandlerMigration),
        Some(StageOutcome::Warning)
    );
    // phpcbf was not installed
    assert_eq!(report.outcome(MigrationStage::AutoFixStyle), Some(StageOutcome::Skipped));
}

#[tokio::test]
async fn test_missing_routes_file_is_skip_not_failure() {
    let dir = project(standard_manifest(), "2.2.0");
    fs::remove_file(dir.path().join("config/routes.php")).unwrap();

    let (report, _) = migrate(&dir, RecordingGateway::new(dir.path())).await;

    assert!(report.succeeded(), "{}", report.summary());
    let routes = report
        .stages
        .iter()
        .find(|s| s.stage == MigrationStage::PatchRoutes)
        .unwrap();
    assert_eq!(routes.outcome, StageOutcome::Skipped);
    assert_eq!(routes.detail.as_deref(), Some("file not found"));
    assert!(!dir.path().join("config/routes.php").exists());
}
