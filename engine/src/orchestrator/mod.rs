//! Migration Orchestrator: sequential, fail-fast stage runner
//!
//! Runs every stage of [`MigrationStage::PIPELINE`] in order. A stage that
//! returns an error moves the run to `Failed` and nothing after it runs;
//! completed stages are not rolled back. Skips and warnings are recorded
//! and the run continues.

pub mod report;
pub mod state_machine;

pub use report::{MigrationReport, StageOutcome, StageResult};
pub use state_machine::{IllegalTransition, MigrationStage, MigrationStateMachine, TransitionRecord};

use crate::atomic::write_atomic;
use crate::config::{MigrationConfig, ProjectSettings};
use crate::error::{MigrationError, MigrationResult};
use crate::fetcher::{SkeletonFetcher, SkeletonFiles};
use crate::gateway::{CommandOutput, PackageManagerGateway};
use crate::manifest::{Classification, LockSnapshot, Manifest, ManifestStore};
use crate::patcher::{ConfigPatcher, PatchOutcome};
use crate::resolver::{DependencySetResolver, TargetPackageSet};
use std::path::Path;
use std::time::Instant;

/// Data handed from one stage to the next
#[derive(Default)]
struct RunState {
    manifest: Option<Manifest>,
    lock: Option<LockSnapshot>,
    version: Option<String>,
    target: Option<TargetPackageSet>,
}

impl RunState {
    fn manifest(&self) -> MigrationResult<&Manifest> {
        self.manifest
            .as_ref()
            .ok_or_else(|| MigrationError::precondition("manifest has not been loaded"))
    }

    fn target(&self) -> MigrationResult<&TargetPackageSet> {
        self.target
            .as_ref()
            .ok_or_else(|| MigrationError::precondition("package changes have not been resolved"))
    }
}

/// Record a command in the stage log and fail on non-zero exit
fn checked(ran: &mut Vec<String>, output: CommandOutput) -> MigrationResult<()> {
    ran.push(output.command.clone());
    output.into_result().map(|_| ())
}

/// Skeleton paths always use forward slashes
fn skeleton_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Drives a migration of one project
pub struct MigrationOrchestrator<G, F> {
    config: MigrationConfig,
    project: ProjectSettings,
    gateway: G,
    skeleton: SkeletonFiles<F>,
    store: ManifestStore,
    resolver: DependencySetResolver,
    patcher: ConfigPatcher,
}

impl<G, F> MigrationOrchestrator<G, F>
where
    G: PackageManagerGateway,
    F: SkeletonFetcher,
{
    pub fn new(config: MigrationConfig, project: ProjectSettings, gateway: G, fetcher: F) -> Self {
        let skeleton = SkeletonFiles::new(fetcher, &config.skeleton);
        let store = ManifestStore::open(&project, &config.files);
        let resolver =
            DependencySetResolver::new(config.packages.clone(), config.composer.why_concurrency);
        let patcher = ConfigPatcher::new(config.callable.clone(), config.pipeline.clone());
        Self {
            config,
            project,
            gateway,
            skeleton,
            store,
            resolver,
            patcher,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn skeleton(&self) -> &SkeletonFiles<F> {
        &self.skeleton
    }

    /// Run every stage; never panics on stage failure
    pub async fn run(&self) -> MigrationReport {
        let started = Instant::now();
        let mut sm = MigrationStateMachine::new();
        let mut report = MigrationReport::new(self.project.root.display().to_string());
        let mut state = RunState::default();

        tracing::info!(project = %self.project.root.display(), "Starting migration");

        for stage in MigrationStage::PIPELINE {
            if let Err(e) = sm.advance(stage, None) {
                tracing::error!(error = %e, "Stage order violated");
                break;
            }
            tracing::info!(stage = %stage, "{}...", stage.description());

            let stage_start = Instant::now();
            match self.run_stage(stage, &mut state).await {
                Ok(mut result) => {
                    result.duration_ms = stage_start.elapsed().as_millis() as u64;
                    Self::announce(&result);
                    report.add_stage(result);
                }
                Err(e) => {
                    tracing::error!(stage = %stage, outcome = %StageOutcome::Failed, error = %e, "Stage failed");
                    let mut result = StageResult::new(stage, StageOutcome::Failed).with_detail(e.to_string());
                    if let MigrationError::ExternalToolFailure { output, .. } = &e {
                        result = result.with_output(output.clone());
                    }
                    result.duration_ms = stage_start.elapsed().as_millis() as u64;
                    report.add_stage(result);

                    report.error = Some(e.to_string());
                    report.error_code = Some(e.code().to_string());
                    report.suggestion = e.recovery_suggestion().map(String::from);
                    if let Err(illegal) = sm.fail(&e.to_string()) {
                        tracing::error!(error = %illegal, "Could not record failure");
                    }
                    break;
                }
            }
            if stage == MigrationStage::Validate {
                report.detected_version = state.version.clone();
            }
        }

        if !sm.is_terminal() {
            if let Err(e) = sm.advance(MigrationStage::Done, None) {
                tracing::error!(error = %e, "Stage order violated");
            }
        }

        report.packages = state.target.take();
        report.transitions = sm.transitions().to_vec();
        report.finalize(sm.current(), started.elapsed());

        tracing::debug!(transitions = %sm.summary(), "Migration state history");
        if report.succeeded() {
            tracing::info!(summary = %report.summary(), "Migration complete");
        } else {
            tracing::error!(summary = %report.summary(), "Migration stopped");
        }
        report
    }

    fn announce(result: &StageResult) {
        let detail = result.detail.as_deref().unwrap_or("");
        match result.outcome {
            StageOutcome::Done => {
                tracing::info!(stage = %result.stage, outcome = %result.outcome, detail, "Stage done")
            }
            StageOutcome::Skipped => {
                tracing::info!(stage = %result.stage, outcome = %result.outcome, reason = detail, "Stage skipped")
            }
            StageOutcome::Warning => {
                tracing::warn!(stage = %result.stage, outcome = %result.outcome, detail, "Stage finished with warnings")
            }
            StageOutcome::Failed => {
                tracing::error!(stage = %result.stage, outcome = %result.outcome, detail, "Stage failed")
            }
        }
    }

    async fn run_stage(&self, stage: MigrationStage, state: &mut RunState) -> MigrationResult<StageResult> {
        match stage {
            MigrationStage::Validate => self.validate(state),
            MigrationStage::Resolve => self.resolve(state),
            MigrationStage::RemoveObsolete => self.remove_obsolete(state).await,
            MigrationStage::ReconcilePackages => self.reconcile_packages(state).await,
            MigrationStage::PatchPipeline => {
                let path = self.project.path(&self.config.files.pipeline);
                Ok(Self::patched(stage, self.patcher.patch_pipeline(&path)?))
            }
            MigrationStage::PatchRoutes => {
                let path = self.project.path(&self.config.files.routes);
                Ok(Self::patched(stage, self.patcher.patch_routes(&path)?))
            }
            MigrationStage::ReplaceEntryPoint => self.replace_entry_point().await,
            MigrationStage::ConditionalContainerSwap => self.swap_container(state).await,
            MigrationStage::DelegateInteropMigration => {
                let src = self.project.interop_src.display().to_string();
                self.delegate(stage, &self.config.scripts.interop_command, &src).await
            }
            MigrationStage::DelegateHandlerMigration => {
                let src = self.project.handlers_src.display().to_string();
                self.delegate(stage, &self.config.scripts.handler_command, &src).await
            }
            MigrationStage::AutoFixStyle => self.auto_fix_style().await,
            MigrationStage::Start | MigrationStage::Done | MigrationStage::Failed => {
                Ok(StageResult::new(stage, StageOutcome::Skipped))
            }
        }
    }

    fn patched(stage: MigrationStage, outcome: PatchOutcome) -> StageResult {
        match outcome {
            PatchOutcome::Applied => StageResult::new(stage, StageOutcome::Done),
            PatchOutcome::Skipped(reason) => {
                StageResult::new(stage, StageOutcome::Skipped).with_detail(reason.to_string())
            }
        }
    }

    fn validate(&self, state: &mut RunState) -> MigrationResult<StageResult> {
        let manifest = self.store.load_manifest()?;
        let lock = self.store.load_lock()?;
        let version = self.resolver.validate(&manifest, lock.as_ref())?;

        for dir in [&self.project.interop_src, &self.project.handlers_src] {
            let path = self.project.path(dir);
            if !path.is_dir() {
                return Err(MigrationError::precondition(format!(
                    "Directory {} does not exist",
                    path.display()
                )));
            }
        }

        let detail = format!("{} {}", self.config.packages.framework_package, version);
        state.manifest = Some(manifest);
        state.lock = lock;
        state.version = Some(version);
        Ok(StageResult::new(MigrationStage::Validate, StageOutcome::Done).with_detail(detail))
    }

    fn resolve(&self, state: &mut RunState) -> MigrationResult<StageResult> {
        let target = self.resolver.plan(state.manifest()?);
        let detail = format!(
            "{} to require, {} to remove, {} reclassified",
            target.to_add.len(),
            target.to_remove.len(),
            target.reclassify.len()
        );
        for (name, change) in &target.reclassify {
            tracing::info!(package = %name, from = %change.from, to = %change.to, "Reclassifying package");
        }
        state.target = Some(target);
        Ok(StageResult::new(MigrationStage::Resolve, StageOutcome::Done).with_detail(detail))
    }

    async fn remove_obsolete(&self, state: &RunState) -> MigrationResult<StageResult> {
        let manifest = state.manifest()?;
        let declared: Vec<String> = state
            .target()?
            .to_remove
            .iter()
            .filter(|name| manifest.declares(name))
            .cloned()
            .collect();

        if declared.is_empty() {
            return Ok(StageResult::new(MigrationStage::RemoveObsolete, StageOutcome::Skipped)
                .with_detail("nothing to remove"));
        }

        let output = self.gateway.remove(&declared, false).await?.into_result()?;
        Ok(StageResult::new(MigrationStage::RemoveObsolete, StageOutcome::Done)
            .with_detail(declared.join(", "))
            .with_output(output.combined()))
    }

    /// Own-package removal, manifest housekeeping, dependant discovery,
    /// then remove/update/require in a fixed order
    async fn reconcile_packages(&self, state: &mut RunState) -> MigrationResult<StageResult> {
        let mut target = state.target()?.clone();
        let mut ran = Vec::new();
        let policy = self.resolver.policy();

        checked(&mut ran, self.gateway.remove(&[policy.self_package.clone()], false).await?)?;

        let vendor = self.project.path(&self.config.files.vendor_dir);
        if vendor.is_dir() {
            tokio::fs::remove_dir_all(&vendor).await?;
            tracing::debug!(path = %vendor.display(), "Removed vendor directory");
        }
        checked(&mut ran, self.gateway.install().await?)?;

        let mut manifest = self.store.load_manifest()?;
        self.housekeeping(&mut manifest);
        self.store.save_manifest(&mut manifest)?;

        match self.store.load_lock()? {
            Some(lock) => {
                self.resolver
                    .discover_dependants(&self.gateway, &manifest, &lock, &mut target)
                    .await;
                state.lock = Some(lock);
            }
            None => tracing::warn!("No lock file after install; skipping dependant discovery"),
        }
        state.manifest = Some(manifest);
        let target = state.target.insert(target);

        let reinstalled = target.reinstalled();
        if !reinstalled.is_empty() {
            checked(&mut ran, self.gateway.remove(&reinstalled, true).await?)?;
            checked(&mut ran, self.gateway.remove(&reinstalled, false).await?)?;
        }
        checked(&mut ran, self.gateway.update().await?)?;

        let requires = [
            (target.additions(Classification::Runtime), false),
            (target.additions(Classification::Development), true),
            (target.repins(Classification::Runtime), false),
            (target.repins(Classification::Development), true),
        ];
        for (names, dev) in requires {
            if !names.is_empty() {
                checked(&mut ran, self.gateway.require(&names, dev).await?)?;
            }
        }

        Ok(StageResult::new(MigrationStage::ReconcilePackages, StageOutcome::Done)
            .with_detail(format!(
                "{} commands, {} dependants repinned",
                ran.len(),
                target.to_preserve_but_repin.len()
            ))
            .with_output(ran.join("\n")))
    }

    fn housekeeping(&self, manifest: &mut Manifest) {
        let rules = &self.config.manifest;
        let scripts = &self.config.scripts;

        manifest.set_sort_packages(true);

        if let Some(php) = manifest.platform_php().map(str::to_string) {
            if !rules.accepted_platform_php.iter().any(|v| php.contains(v.as_str())) {
                tracing::info!(from = %php, to = %rules.platform_php, "Pinning platform PHP version");
                manifest.set_platform_php(&rules.platform_php);
            }
        }

        let bin = self.project.path(&self.config.files.vendor_dir).join("bin");
        if bin.join(&scripts.cs_check_binary).exists() {
            manifest.set_script(&scripts.cs_check_script, &scripts.cs_check_binary);
        }
        if bin.join(&scripts.cs_fix_binary).exists() {
            manifest.set_script(&scripts.cs_fix_script, &scripts.cs_fix_binary);
        }
        manifest.set_script(&scripts.tooling_script, &scripts.tooling_script);
    }

    async fn replace_entry_point(&self) -> MigrationResult<StageResult> {
        let relative = &self.config.files.entry_point;
        let content = self.skeleton.fetch(&skeleton_path(relative)).await?;
        write_atomic(self.project.path(relative), content)?;
        let tag = self.skeleton.version_tag().await?;
        Ok(StageResult::new(MigrationStage::ReplaceEntryPoint, StageOutcome::Done)
            .with_detail(format!("skeleton {tag}")))
    }

    async fn swap_container(&self, state: &RunState) -> MigrationResult<StageResult> {
        let target = state.target()?;
        let mut swapped = Vec::new();
        for swap in &self.config.container_swaps {
            if !target.to_add.contains_key(&swap.adapter_package) {
                continue;
            }
            let content = self.skeleton.fetch(&swap.reference_path).await?;
            write_atomic(self.project.path(&self.config.files.container), content)?;
            tracing::info!(adapter = %swap.adapter_package, "Replaced container configuration");
            swapped.push(swap.adapter_package.clone());
        }

        if swapped.is_empty() {
            return Ok(StageResult::new(MigrationStage::ConditionalContainerSwap, StageOutcome::Skipped)
                .with_detail("no container adapter added"));
        }
        Ok(StageResult::new(MigrationStage::ConditionalContainerSwap, StageOutcome::Done)
            .with_detail(swapped.join(", ")))
    }

    /// Hand a source directory to a framework tooling command
    async fn delegate(&self, stage: MigrationStage, command: &str, src: &str) -> MigrationResult<StageResult> {
        let args = vec![command.to_string(), "--src".to_string(), src.to_string()];
        let result = self
            .gateway
            .run_script(&self.config.scripts.tooling_script, &args)
            .await;
        Self::soft_script_result(stage, result)
    }

    async fn auto_fix_style(&self) -> MigrationResult<StageResult> {
        let scripts = &self.config.scripts;
        let binary = self
            .project
            .path(&self.config.files.vendor_dir)
            .join("bin")
            .join(&scripts.cs_fix_binary);
        if !binary.exists() {
            return Ok(StageResult::new(MigrationStage::AutoFixStyle, StageOutcome::Skipped)
                .with_detail(format!("{} not installed", scripts.cs_fix_binary)));
        }
        let result = self.gateway.run_script(&scripts.cs_fix_script, &[]).await;
        Self::soft_script_result(MigrationStage::AutoFixStyle, result)
    }

    /// Non-zero exits and launch failures of delegated scripts are warnings
    fn soft_script_result(
        stage: MigrationStage,
        result: MigrationResult<CommandOutput>,
    ) -> MigrationResult<StageResult> {
        match result {
            Ok(output) if output.success() => {
                Ok(StageResult::new(stage, StageOutcome::Done).with_output(output.combined()))
            }
            Ok(output) => Ok(StageResult::new(stage, StageOutcome::Warning)
                .with_detail(format!(
                    "`{}` exited with {}",
                    output.command,
                    output.exit_code.map_or_else(|| "no status".to_string(), |c| c.to_string())
                ))
                .with_output(output.combined())),
            Err(e @ MigrationError::ExternalToolFailure { .. }) => {
                Ok(StageResult::new(stage, StageOutcome::Warning).with_detail(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
