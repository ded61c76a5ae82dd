//! Resolver output

use crate::manifest::{Classification, PackageEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A package that stays installed but changes classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reclassification {
    pub from: Classification,
    pub to: Classification,
}

/// Packages to remove, add, reclassify and repin
///
/// `to_remove` and the keys of `to_add` are disjoint. A package whose
/// classification changes appears in `to_add` under its target
/// classification and in `reclassify`, never in `to_remove`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPackageSet {
    pub to_remove: BTreeSet<String>,
    pub to_add: BTreeMap<String, PackageEntry>,
    pub reclassify: BTreeMap<String, Reclassification>,
    /// Declared dependants of changing packages, by current classification
    pub to_preserve_but_repin: BTreeMap<String, Classification>,
}

impl TargetPackageSet {
    /// Add (or replace) a package under a target classification
    pub fn add(&mut self, name: &str, classification: Classification) {
        self.add_entry(PackageEntry::new(name, "", classification));
    }

    /// Add a declared entry, keeping its constraint
    pub fn add_entry(&mut self, entry: PackageEntry) {
        self.to_remove.remove(&entry.name);
        self.to_add.insert(entry.name.clone(), entry);
    }

    /// Mark a package for removal; cancels any pending addition
    pub fn remove(&mut self, name: &str) {
        let name = name.to_lowercase();
        self.to_add.remove(&name);
        self.reclassify.remove(&name);
        self.to_remove.insert(name);
    }

    /// Drop a package from every list
    pub fn forget(&mut self, name: &str) {
        let name = name.to_lowercase();
        self.to_add.remove(&name);
        self.to_remove.remove(&name);
        self.reclassify.remove(&name);
        self.to_preserve_but_repin.remove(&name);
    }

    /// Whether `name` is being added, removed or reclassified
    pub fn is_changing(&self, name: &str) -> bool {
        self.to_add.contains_key(name) || self.to_remove.contains(name)
    }

    /// Names of `to_add` with the given target classification
    pub fn additions(&self, classification: Classification) -> Vec<String> {
        self.to_add
            .values()
            .filter(|e| e.classification == classification)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Repin names with the given classification
    pub fn repins(&self, classification: Classification) -> Vec<String> {
        self.to_preserve_but_repin
            .iter()
            .filter(|(_, c)| **c == classification)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names uninstalled before the update: every addition and repin
    /// except reclassified packages, which are moved in place by `require`
    pub fn reinstalled(&self) -> Vec<String> {
        let mut names: BTreeSet<&String> = self.to_add.keys().collect();
        names.extend(self.to_preserve_but_repin.keys());
        names
            .into_iter()
            .filter(|name| !self.reclassify.contains_key(*name))
            .cloned()
            .collect()
    }
}
