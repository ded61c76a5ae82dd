//! Manifest and lock snapshot data types

use crate::error::{MigrationError, MigrationResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static VERSION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+(\.\d+)?").expect("VERSION_NUMBER regex should compile")
});

const REQUIRE: &str = "require";
const REQUIRE_DEV: &str = "require-dev";

/// Runtime vs. development dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Runtime,
    Development,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Development => write!(f, "dev"),
        }
    }
}

/// One declared dependency; `name` is lower-cased and unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub constraint: String,
    pub classification: Classification,
}

impl PackageEntry {
    pub fn new(
        name: impl Into<String>,
        constraint: impl Into<String>,
        classification: Classification,
    ) -> Self {
        Self {
            name: name.into().to_lowercase(),
            constraint: constraint.into(),
            classification,
        }
    }
}

/// composer.json as an ordered JSON object
///
/// Sections the engine does not understand are carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    data: Map<String, Value>,
}

impl Manifest {
    /// Wrap a parsed document; the root must be an object
    pub fn from_value(path: &Path, value: Value) -> MigrationResult<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            _ => Err(MigrationError::invalid_manifest(
                path,
                "root element is not an object",
            )),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// The project's own package name
    pub fn name(&self) -> Option<String> {
        self.data
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
    }

    /// `require`, names lower-cased
    pub fn require(&self) -> BTreeMap<String, String> {
        self.section_packages(REQUIRE)
    }

    /// `require-dev`, names lower-cased
    pub fn require_dev(&self) -> BTreeMap<String, String> {
        self.section_packages(REQUIRE_DEV)
    }

    fn section_packages(&self, section: &str) -> BTreeMap<String, String> {
        let Some(Value::Object(map)) = self.data.get(section) else {
            return BTreeMap::new();
        };
        map.iter()
            .map(|(name, constraint)| {
                let constraint = match constraint {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.to_lowercase(), constraint)
            })
            .collect()
    }

    /// All declared dependencies; a dev declaration wins on duplicates
    pub fn entries(&self) -> BTreeMap<String, PackageEntry> {
        let mut entries = BTreeMap::new();
        for (classification, packages) in [
            (Classification::Runtime, self.require()),
            (Classification::Development, self.require_dev()),
        ] {
            for (name, constraint) in packages {
                entries.insert(
                    name.clone(),
                    PackageEntry::new(name, constraint, classification),
                );
            }
        }
        entries
    }

    /// Whether `name` is declared in either requirement section
    pub fn declares(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.require().contains_key(&name) || self.require_dev().contains_key(&name)
    }

    /// `config.platform.php`, if pinned
    pub fn platform_php(&self) -> Option<&str> {
        self.data
            .get("config")?
            .get("platform")?
            .get("php")?
            .as_str()
    }

    pub fn set_sort_packages(&mut self, enabled: bool) {
        self.object_mut("config")
            .insert("sort-packages".to_string(), Value::Bool(enabled));
    }

    pub fn set_platform_php(&mut self, version: &str) {
        let config = self.object_mut("config");
        let platform = config
            .entry("platform")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(platform) = as_object_mut(platform) {
            platform.insert("php".to_string(), Value::String(version.to_string()));
        }
    }

    pub fn set_script(&mut self, name: &str, command: &str) {
        self.object_mut("scripts")
            .insert(name.to_string(), Value::String(command.to_string()));
    }

    /// Drop every top-level section that is an empty object or array
    pub fn prune_empty_sections(&mut self) {
        self.data.retain(|_, value| match value {
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        });
    }

    /// Get a top-level object section, creating or normalizing it
    fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let value = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !value.is_object() {
            *value = Value::Object(Map::new());
        }
        match value {
            Value::Object(map) => map,
            _ => unreachable!("section was just normalized to an object"),
        }
    }
}

/// An empty array is how PHP encodes an empty object
fn as_object_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if matches!(value, Value::Array(items) if items.is_empty()) {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

/// A resolved package from composer.lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPackage {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// composer.lock, read-only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSnapshot {
    #[serde(default)]
    pub packages: Vec<LockPackage>,
    #[serde(rename = "packages-dev", default)]
    pub packages_dev: Option<Vec<LockPackage>>,
}

impl LockSnapshot {
    /// Runtime then development packages
    pub fn all(&self) -> impl Iterator<Item = &LockPackage> {
        self.packages
            .iter()
            .chain(self.packages_dev.iter().flatten())
    }

    /// Raw resolved version string of `name`
    pub fn resolved_version(&self, name: &str) -> Option<&str> {
        self.all()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.version.as_str())
    }

    /// Numeric version of `name`, e.g. `v2.1.0` -> `2.1.0`
    ///
    /// Only the first lock entry with a matching name is considered.
    pub fn detect_version(&self, name: &str) -> Option<String> {
        let raw = self.resolved_version(name)?;
        VERSION_NUMBER.find(raw).map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        Manifest::from_value(Path::new("composer.json"), value).unwrap()
    }

    #[test]
    fn test_root_must_be_object() {
        let err = Manifest::from_value(Path::new("composer.json"), json!([])).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidManifest { .. }));
    }

    #[test]
    fn test_requirements_are_lowercased() {
        let m = manifest(json!({
            "require": { "Mezzio/Mezzio": "^2.0", "php": "^7.1" },
            "require-dev": { "PHPUnit/PHPUnit": "^7.0" }
        }));
        assert_eq!(m.require().get("mezzio/mezzio").map(String::as_str), Some("^2.0"));
        assert!(m.require_dev().contains_key("phpunit/phpunit"));
        assert!(m.declares("MEZZIO/mezzio"));
        assert!(!m.declares("aura/di"));
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let m = manifest(json!({ "name": "acme/app" }));
        assert!(m.require().is_empty());
        assert!(m.require_dev().is_empty());
        assert_eq!(m.name().as_deref(), Some("acme/app"));
    }

    #[test]
    fn test_entries_dev_wins_on_duplicate() {
        let m = manifest(json!({
            "require": { "laminas/laminas-component-installer": "^1.0" },
            "require-dev": { "laminas/laminas-component-installer": "^2.0" }
        }));
        let entries = m.entries();
        let entry = &entries["laminas/laminas-component-installer"];
        assert_eq!(entry.classification, Classification::Development);
        assert_eq!(entry.constraint, "^2.0");
    }

    #[test]
    fn test_config_edits_create_sections() {
        let mut m = manifest(json!({ "name": "acme/app", "config": [] }));
        m.set_sort_packages(true);
        m.set_platform_php("7.1.3");
        m.set_script("mezzio", "mezzio");

        assert_eq!(m.as_map()["config"]["sort-packages"], json!(true));
        assert_eq!(m.platform_php(), Some("7.1.3"));
        assert_eq!(m.as_map()["scripts"]["mezzio"], json!("mezzio"));
    }

    #[test]
    fn test_platform_php_replaces_empty_array_platform() {
        let mut m = manifest(json!({ "config": { "platform": [] } }));
        m.set_platform_php("7.1.3");
        assert_eq!(m.platform_php(), Some("7.1.3"));
    }

    #[test]
    fn test_prune_empty_sections() {
        let mut m = manifest(json!({
            "name": "acme/app",
            "require": {},
            "require-dev": [],
            "scripts": { "test": "phpunit" },
            "minimum-stability": "stable"
        }));
        m.prune_empty_sections();
        let keys: Vec<&str> = m.as_map().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "scripts", "minimum-stability"]);
    }

    #[test]
    fn test_detect_version_strips_prefix() {
        let lock: LockSnapshot = serde_json::from_value(json!({
            "packages": [
                { "name": "Mezzio/Mezzio", "version": "v2.1.3" },
                { "name": "laminas/laminas-diactoros", "version": "1.8.6" }
            ]
        }))
        .unwrap();
        assert_eq!(lock.detect_version("mezzio/mezzio").as_deref(), Some("2.1.3"));
        assert_eq!(lock.detect_version("aura/di"), None);
    }

    #[test]
    fn test_detect_version_searches_dev_packages() {
        let lock: LockSnapshot = serde_json::from_value(json!({
            "packages": [],
            "packages-dev": [ { "name": "mezzio/mezzio", "version": "2.0" } ]
        }))
        .unwrap();
        assert_eq!(lock.detect_version("mezzio/mezzio").as_deref(), Some("2.0"));
    }

    #[test]
    fn test_detect_version_rejects_branch_alias() {
        let lock: LockSnapshot = serde_json::from_value(json!({
            "packages": [ { "name": "mezzio/mezzio", "version": "dev-master" } ]
        }))
        .unwrap();
        assert_eq!(lock.detect_version("mezzio/mezzio"), None);
    }
}
