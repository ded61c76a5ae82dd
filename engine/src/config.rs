//! Migration configuration
//!
//! Every fixed table the engine consults lives here as plain data: the
//! managed-package allow-list, substitution rules, pipeline rewrite table,
//! anchor markers and skeleton locations. Defaults encode the Mezzio v2 to
//! v3 migration; a TOML file or environment variables can override them.

use crate::error::{MigrationError, MigrationResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub packages: PackagePolicy,
    pub manifest: ManifestRules,
    pub pipeline: PipelineRules,
    pub callable: CallableTemplate,
    pub files: ProjectFiles,
    pub skeleton: SkeletonSettings,
    pub composer: ComposerSettings,
    pub scripts: ScriptSettings,
    pub container_swaps: Vec<ContainerSwap>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            packages: PackagePolicy::default(),
            manifest: ManifestRules::default(),
            pipeline: PipelineRules::default(),
            callable: CallableTemplate::default(),
            files: ProjectFiles::default(),
            skeleton: SkeletonSettings::default(),
            composer: ComposerSettings::default(),
            scripts: ScriptSettings::default(),
            container_swaps: default_container_swaps(),
        }
    }
}

impl MigrationConfig {
    /// Load from a TOML file; absent keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> MigrationResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| MigrationError::config(format!("{}: {}", path.display(), e)))
    }

    /// Default config with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `MEZZIO_MIGRATION_*` environment overrides in place
    pub fn apply_env(&mut self) {
        if let Ok(binary) = std::env::var("MEZZIO_MIGRATION_COMPOSER") {
            self.composer.binary = binary;
        }
        if let Ok(secs) = std::env::var("MEZZIO_MIGRATION_TIMEOUT_SECS") {
            if let Ok(n) = secs.parse() {
                self.composer.timeout_secs = n;
            }
        }
        if let Ok(n) = std::env::var("MEZZIO_MIGRATION_WHY_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                self.composer.why_concurrency = n.max(1);
            }
        }
        if let Ok(tag) = std::env::var("MEZZIO_MIGRATION_SKELETON_BRANCH") {
            if !tag.is_empty() {
                self.skeleton.pinned_tag = Some(tag);
            }
        }
    }
}

/// Which packages the resolver manages and how it rewrites them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagePolicy {
    /// Package whose presence and version gate the migration
    pub framework_package: String,
    /// Required prefix of the framework's resolved version
    pub supported_major: String,
    /// The migration tool's own package name
    pub self_package: String,
    /// Managed regardless of namespace
    pub managed_packages: Vec<String>,
    /// Namespace prefix of the framework family
    pub managed_prefix: String,
    /// Obsolete packages and their replacements
    pub substitutions: Vec<SubstitutionRule>,
    /// Always required under runtime classification
    pub http_message_package: String,
    /// Always required under development classification
    pub dev_packages: Vec<String>,
}

impl Default for PackagePolicy {
    fn default() -> Self {
        Self {
            framework_package: "mezzio/mezzio".to_string(),
            supported_major: "2.".to_string(),
            self_package: "mezzio/mezzio-migration".to_string(),
            managed_packages: vec![
                "laminas/laminas-diactoros".to_string(),
                "laminas/laminas-component-installer".to_string(),
                "mezzio/mezzio-problem-details".to_string(),
                "laminas/laminas-stratigility".to_string(),
            ],
            managed_prefix: "mezzio/mezzio".to_string(),
            substitutions: vec![
                SubstitutionRule {
                    triggers: vec!["aura/di".to_string()],
                    remove: vec!["aura/di".to_string()],
                    replacement: Some("laminas/laminas-auradi-config".to_string()),
                },
                SubstitutionRule {
                    triggers: vec![
                        "pimple/pimple".to_string(),
                        "xtreamwayz/pimple-container-interop".to_string(),
                    ],
                    remove: vec![
                        "pimple/pimple".to_string(),
                        "xtreamwayz/pimple-container-interop".to_string(),
                    ],
                    replacement: Some("laminas/laminas-pimple-config".to_string()),
                },
                SubstitutionRule {
                    triggers: vec!["http-interop/http-middleware".to_string()],
                    remove: vec!["http-interop/http-middleware".to_string()],
                    replacement: None,
                },
            ],
            http_message_package: "laminas/laminas-diactoros".to_string(),
            dev_packages: vec![
                "laminas/laminas-component-installer".to_string(),
                "mezzio/mezzio-tooling".to_string(),
            ],
        }
    }
}

/// Fires when any trigger is declared; removes `remove`, adds `replacement`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub triggers: Vec<String>,
    pub remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

/// composer.json housekeeping applied before packages are reconciled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestRules {
    /// `config.platform.php` values containing one of these are kept
    pub accepted_platform_php: Vec<String>,
    /// Replacement for any other `config.platform.php`
    pub platform_php: String,
}

impl Default for ManifestRules {
    fn default() -> Self {
        Self {
            accepted_platform_php: vec!["7.1".to_string(), "7.2".to_string(), "7.3".to_string()],
            platform_php: "7.1.3".to_string(),
        }
    }
}

/// Literal replacement applied to the pipeline file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
}

impl RewriteRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Pipeline file rewrite table, anchors and the stage to insert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRules {
    pub rewrites: Vec<RewriteRule>,
    /// Ordered; ties on offset go to the earlier entry
    pub anchors: Vec<String>,
    pub inserted_stage: String,
}

impl Default for PipelineRules {
    fn default() -> Self {
        Self {
            rewrites: vec![
                RewriteRule::new(
                    "->pipeRoutingMiddleware();",
                    r"->pipe(\Mezzio\Router\Middleware\RouteMiddleware::class);",
                ),
                RewriteRule::new(
                    "->pipeDispatchMiddleware();",
                    r"->pipe(\Mezzio\Router\Middleware\DispatchMiddleware::class);",
                ),
                RewriteRule::new(
                    r"Mezzio\Middleware\NotFoundHandler",
                    r"Mezzio\Handler\NotFoundHandler",
                ),
                RewriteRule::new(
                    r"Mezzio\Middleware\ImplicitHeadMiddleware",
                    r"Mezzio\Router\Middleware\ImplicitHeadMiddleware",
                ),
                RewriteRule::new(
                    r"Mezzio\Middleware\ImplicitOptionsMiddleware",
                    r"Mezzio\Router\Middleware\ImplicitOptionsMiddleware",
                ),
            ],
            anchors: vec![
                "RouteMiddleware::class);".to_string(),
                "ImplicitHeadMiddleware::class);".to_string(),
                "ImplicitHeadMiddleware');".to_string(),
                "ImplicitHeadMiddleware\");".to_string(),
                "ImplicitOptionsMiddleware::class);".to_string(),
                "ImplicitOptionsMiddleware\");".to_string(),
                "DispatchMiddleware::class);".to_string(),
            ],
            inserted_stage: r"$app->pipe(\Mezzio\Router\Middleware\MethodNotAllowedMiddleware::class);"
                .to_string(),
        }
    }
}

/// One typed parameter of the callable preamble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableParameter {
    pub type_name: String,
    pub name: String,
}

/// Shape of the callable a configuration script is wrapped into
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallableTemplate {
    /// Presence means the file is already wrapped
    pub marker: String,
    pub open_tag: String,
    pub strict_types_marker: String,
    pub strict_types_declaration: String,
    /// Variable whose first member access starts the wrapped body
    pub builder_variable: String,
    pub parameters: Vec<CallableParameter>,
    pub return_type: String,
    pub closing: String,
}

impl Default for CallableTemplate {
    fn default() -> Self {
        Self {
            marker: "return function".to_string(),
            open_tag: "<?php".to_string(),
            strict_types_marker: "strict_types".to_string(),
            strict_types_declaration: "declare(strict_types=1);".to_string(),
            builder_variable: "$app".to_string(),
            parameters: vec![
                CallableParameter {
                    type_name: r"\Mezzio\Application".to_string(),
                    name: "$app".to_string(),
                },
                CallableParameter {
                    type_name: r"\Mezzio\MiddlewareFactory".to_string(),
                    name: "$factory".to_string(),
                },
                CallableParameter {
                    type_name: r"\Psr\Container\ContainerInterface".to_string(),
                    name: "$container".to_string(),
                },
            ],
            return_type: "void".to_string(),
            closing: "};".to_string(),
        }
    }
}

impl CallableTemplate {
    /// `return function (\n    \T $a,\n ...\n) : void {`
    pub fn preamble(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("    {} {}", p.type_name, p.name))
            .collect();
        format!(
            "{} (\n{}\n) : {} {{",
            self.marker,
            params.join(",\n"),
            self.return_type
        )
    }
}

/// Project-relative paths of the files under migration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFiles {
    pub manifest: PathBuf,
    pub lock: PathBuf,
    pub vendor_dir: PathBuf,
    pub pipeline: PathBuf,
    pub routes: PathBuf,
    pub entry_point: PathBuf,
    pub container: PathBuf,
}

impl Default for ProjectFiles {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("composer.json"),
            lock: PathBuf::from("composer.lock"),
            vendor_dir: PathBuf::from("vendor"),
            pipeline: PathBuf::from("config/pipeline.php"),
            routes: PathBuf::from("config/routes.php"),
            entry_point: PathBuf::from("public/index.php"),
            container: PathBuf::from("config/container.php"),
        }
    }
}

/// Where reference files of the target release come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonSettings {
    pub package: String,
    pub repository: String,
    pub version_pattern: String,
    pub default_branch: String,
    /// `{package}` is substituted
    pub metadata_url: String,
    /// `{repository}`, `{tag}` and `{path}` are substituted
    pub raw_url: String,
    /// Skip release detection and use this tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_tag: Option<String>,
}

impl Default for SkeletonSettings {
    fn default() -> Self {
        Self {
            package: "mezzio/mezzio-skeleton".to_string(),
            repository: "mezzio/mezzio-skeleton".to_string(),
            version_pattern: r"^3\.\d+\.\d+$".to_string(),
            default_branch: "master".to_string(),
            metadata_url: "https://packagist.org/packages/{package}.json".to_string(),
            raw_url: "https://raw.githubusercontent.com/{repository}/{tag}/{path}".to_string(),
            pinned_tag: None,
        }
    }
}

/// How the package manager binary is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    pub binary: String,
    /// Maximum time per command (seconds)
    pub timeout_secs: u64,
    /// Parallel reverse-dependency queries
    pub why_concurrency: usize,
    /// Truncate captured output to this many bytes
    pub output_max_bytes: usize,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            binary: "composer".to_string(),
            timeout_secs: 900,
            why_concurrency: 4,
            output_max_bytes: 8192,
        }
    }
}

/// Composer scripts the migration registers and delegates to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// Script name and command registered for the framework tooling
    pub tooling_script: String,
    pub interop_command: String,
    pub handler_command: String,
    pub cs_check_script: String,
    pub cs_check_binary: String,
    pub cs_fix_script: String,
    pub cs_fix_binary: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            tooling_script: "mezzio".to_string(),
            interop_command: "migrate:interop-middleware".to_string(),
            handler_command: "migrate:middleware-to-request-handler".to_string(),
            cs_check_script: "cs-check".to_string(),
            cs_check_binary: "phpcs".to_string(),
            cs_fix_script: "cs-fix".to_string(),
            cs_fix_binary: "phpcbf".to_string(),
        }
    }
}

/// Replace the container wiring when an adapter package is being added
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSwap {
    pub adapter_package: String,
    /// Path inside the skeleton repository
    pub reference_path: String,
}

fn default_container_swaps() -> Vec<ContainerSwap> {
    vec![
        ContainerSwap {
            adapter_package: "laminas/laminas-pimple-config".to_string(),
            reference_path: "src/MezzioInstaller/Resources/config/container-pimple.php".to_string(),
        },
        ContainerSwap {
            adapter_package: "laminas/laminas-auradi-config".to_string(),
            reference_path: "src/MezzioInstaller/Resources/config/container-aura-di.php"
                .to_string(),
        },
    ]
}

/// Per-run project settings, separate from the rule tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Application root (directory holding composer.json)
    pub root: PathBuf,
    /// Sources scanned by the interop-middleware converter
    pub interop_src: PathBuf,
    /// Sources scanned by the middleware-to-handler converter
    pub handlers_src: PathBuf,
}

impl ProjectSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interop_src: PathBuf::from("src"),
            handlers_src: PathBuf::from("src"),
        }
    }

    /// Resolve a project-relative path
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }
}
