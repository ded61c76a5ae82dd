//! Dependency Set Resolver
//!
//! Decides which packages must be removed, added, reclassified or
//! repinned to move a project onto the target framework release.
//!
//! Resolution runs in two phases:
//! 1. [`DependencySetResolver::plan`] is pure: it reads the manifest and
//!    the package policy and fills `to_remove`, `to_add` and `reclassify`.
//! 2. [`DependencySetResolver::discover_dependants`] asks the package
//!    manager which declared packages depend on the managed packages in
//!    the lock snapshot and fills `to_preserve_but_repin`.
//!
//! [`DependencySetResolver::resolve`] runs validation and both phases.

pub mod policy;
pub mod target;

pub use policy::{fired_substitutions, is_managed};
pub use target::{Reclassification, TargetPackageSet};

use crate::config::PackagePolicy;
use crate::error::{MigrationError, MigrationResult};
use crate::gateway::PackageManagerGateway;
use crate::manifest::{Classification, LockSnapshot, Manifest};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};

/// Computes the [`TargetPackageSet`] for a project
#[derive(Debug, Clone)]
pub struct DependencySetResolver {
    policy: PackagePolicy,
    concurrency: usize,
}

impl DependencySetResolver {
    /// Create resolver; `concurrency` bounds parallel `why` queries
    pub fn new(policy: PackagePolicy, concurrency: usize) -> Self {
        Self {
            policy,
            concurrency: concurrency.max(1),
        }
    }

    pub fn policy(&self) -> &PackagePolicy {
        &self.policy
    }

    /// Check the framework is declared and installed at a supported major
    ///
    /// Returns the detected framework version.
    pub fn validate(&self, manifest: &Manifest, lock: Option<&LockSnapshot>) -> MigrationResult<String> {
        let framework = &self.policy.framework_package;
        if !manifest.declares(framework) {
            return Err(MigrationError::precondition(format!(
                "Package {framework} has not been detected."
            )));
        }

        let version = lock
            .and_then(|lock| lock.detect_version(framework))
            .ok_or_else(|| {
                MigrationError::precondition(format!("Cannot detect {framework} version."))
            })?;

        if !version.starts_with(&self.policy.supported_major) {
            return Err(MigrationError::UnsupportedVersion {
                package: framework.clone(),
                version,
                required: self.policy.supported_major.clone(),
            });
        }

        tracing::info!(package = %framework, version = %version, "Detected framework version");
        Ok(version)
    }

    /// Removals, additions and reclassifications derived from the manifest
    pub fn plan(&self, manifest: &Manifest) -> TargetPackageSet {
        let declared = manifest.entries();
        let mut target = TargetPackageSet::default();

        for entry in declared.values() {
            if is_managed(&entry.name, &self.policy) {
                target.add_entry(entry.clone());
            }
        }

        for rule in fired_substitutions(&self.policy, |name| declared.contains_key(&name.to_lowercase())) {
            for name in &rule.remove {
                target.remove(name);
            }
            if let Some(replacement) = &rule.replacement {
                target.add(replacement, Classification::Runtime);
            }
            tracing::debug!(triggers = ?rule.triggers, replacement = ?rule.replacement, "Substitution rule fired");
        }

        target.add(&self.policy.http_message_package, Classification::Runtime);
        for name in &self.policy.dev_packages {
            target.add(name, Classification::Development);
        }

        target.forget(&self.policy.self_package);
        if let Some(own) = manifest.name() {
            target.forget(&own);
        }

        for (name, entry) in &target.to_add {
            if let Some(current) = declared.get(name) {
                if current.classification != entry.classification {
                    target.reclassify.insert(
                        name.clone(),
                        Reclassification {
                            from: current.classification,
                            to: entry.classification,
                        },
                    );
                }
            }
        }

        target
    }

    /// Fill `to_preserve_but_repin` from reverse-dependency queries
    ///
    /// Every managed package in the lock snapshot is queried. A failed
    /// query is logged and skipped. Dependants not declared in the
    /// manifest are dropped; a runtime declaration wins over a dev one.
    pub async fn discover_dependants<G>(
        &self,
        gateway: &G,
        manifest: &Manifest,
        lock: &LockSnapshot,
        target: &mut TargetPackageSet,
    ) where
        G: PackageManagerGateway + ?Sized,
    {
        let queried: BTreeSet<String> = lock
            .all()
            .map(|p| p.name.to_lowercase())
            .filter(|name| is_managed(name, &self.policy))
            .collect();

        let results: Vec<(String, MigrationResult<Vec<String>>)> = stream::iter(queried)
            .map(|name| async move {
                let result = gateway.why_depends_on(&name).await;
                (name, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut dependants = BTreeSet::new();
        for (name, result) in results {
            match result {
                Ok(found) => dependants.extend(found),
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "Reverse-dependency query failed; skipping");
                }
            }
        }

        if let Some(own) = manifest.name() {
            dependants.remove(&own);
        }
        dependants.remove(&self.policy.self_package);

        let require = manifest.require();
        let require_dev = manifest.require_dev();
        let mut repin = BTreeMap::new();
        for name in dependants {
            if target.is_changing(&name) {
                continue;
            }
            if require.contains_key(&name) {
                repin.insert(name, Classification::Runtime);
            } else if require_dev.contains_key(&name) {
                repin.insert(name, Classification::Development);
            }
        }

        tracing::debug!(count = repin.len(), "Dependants to repin");
        target.to_preserve_but_repin = repin;
    }

    /// Validate, plan and discover dependants in one call
    pub async fn resolve<G>(
        &self,
        gateway: &G,
        manifest: &Manifest,
        lock: &LockSnapshot,
    ) -> MigrationResult<TargetPackageSet>
    where
        G: PackageManagerGateway + ?Sized,
    {
        self.validate(manifest, Some(lock))?;
        let mut target = self.plan(manifest);
        self.discover_dependants(gateway, manifest, lock, &mut target).await;
        Ok(target)
    }
}
