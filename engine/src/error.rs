//! Migration error types
//!
//! Every fatal outcome of the engine is a [`MigrationError`]. Idempotency
//! skips are not errors and never appear here; see
//! [`crate::patcher::PatchOutcome`] and [`crate::orchestrator::StageOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors that can occur while migrating a project
#[derive(Error, Debug)]
pub enum MigrationError {
    /// A precondition does not hold; raised before anything is mutated
    #[error("Precondition not met: {message}")]
    PreconditionNotMet { message: String },

    /// The framework is installed at a major version this tool cannot migrate
    #[error("Unsupported version {version} of {package}: only {required}x can be migrated")]
    UnsupportedVersion {
        package: String,
        version: String,
        required: String,
    },

    /// An external tool exited with a non-zero status
    #[error("Command `{command}` failed with exit code {}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExternalToolFailure {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// None of the anchor markers were found in a pipeline file
    #[error("No anchor marker found in {path}; file structure not recognized")]
    NoAnchorFound { path: PathBuf },

    /// composer.json or composer.lock has an unexpected shape
    #[error("Invalid manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// Reference file could not be downloaded
    #[error("Failed to fetch {resource}: {message}")]
    Fetch { resource: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrationError {
    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionNotMet {
            message: message.into(),
        }
    }

    /// Create an external tool failure
    pub fn external(command: impl Into<String>, exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            command: command.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a fetch error
    pub fn fetch(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error aborts the migration before any mutation happens
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::PreconditionNotMet { .. } | Self::UnsupportedVersion { .. }
        )
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::PreconditionNotMet { .. } => "PRECONDITION_NOT_MET",
            Self::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            Self::ExternalToolFailure { .. } => "EXTERNAL_TOOL_FAILURE",
            Self::NoAnchorFound { .. } => "NO_ANCHOR_FOUND",
            Self::InvalidManifest { .. } => "INVALID_MANIFEST",
            Self::Fetch { .. } => "FETCH_FAILED",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::PreconditionNotMet { .. } => Some(
                "Run the tool from the application root (or pass its path) and make sure \
                 composer.json requires mezzio/mezzio and composer.lock is present.",
            ),
            Self::UnsupportedVersion { .. } => Some(
                "Only Mezzio v2 applications can be migrated. Check the installed version: \
                 composer show mezzio/mezzio",
            ),
            Self::ExternalToolFailure { .. } => Some(
                "The migration stopped part-way and nothing was rolled back. Inspect the \
                 command output above, fix the dependency conflict, and rerun the tool; \
                 already-migrated files are skipped.",
            ),
            Self::NoAnchorFound { .. } => Some(
                "config/pipeline.php does not pipe the routing middleware. Add \
                 MethodNotAllowedMiddleware to the pipeline by hand.",
            ),
            Self::InvalidManifest { .. } => Some(
                "Validate the file: composer validate",
            ),
            Self::Fetch { .. } => Some(
                "Check network access to packagist.org and raw.githubusercontent.com, or set \
                 MEZZIO_MIGRATION_SKELETON_BRANCH to a known tag.",
            ),
            Self::Config { .. } => Some("Check the migration config file and environment variables."),
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Some("File or directory not found. Check the path exists.")
                }
                std::io::ErrorKind::PermissionDenied => {
                    Some("Permission denied. Check file permissions: ls -la <path>")
                }
                _ => Some("IO error occurred. Check disk space and file permissions."),
            },
            Self::Json(_) => Some("JSON parsing failed. Validate the file: composer validate"),
        }
    }
}
