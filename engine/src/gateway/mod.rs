//! Package Manager Gateway
//!
//! The engine never edits dependency graphs itself. Install, remove,
//! require, update and reverse-dependency queries are delegated to the
//! package manager through [`PackageManagerGateway`]; [`ComposerGateway`]
//! is the implementation that shells out to `composer`.

pub mod composer;

pub use composer::{parse_why_output, ComposerGateway};

use crate::error::{MigrationError, MigrationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Captured result of one external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Command line as shown to the user
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }

    /// `Ok(self)` on exit code 0, otherwise an [`MigrationError::ExternalToolFailure`]
    pub fn into_result(self) -> MigrationResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            let output = self.combined();
            Err(MigrationError::external(self.command, self.exit_code, output))
        }
    }
}

/// Operations the migration needs from the package manager
///
/// Implementations return `Ok` whenever the command ran, whatever its exit
/// code; `Err` means it could not be run at all (missing binary, timeout).
/// `why_depends_on` is the exception: a non-zero exit is an `Err`.
#[async_trait]
pub trait PackageManagerGateway: Send + Sync {
    /// Install the locked dependency set
    async fn install(&self) -> MigrationResult<CommandOutput>;

    /// Remove packages from `require` (or `require-dev` when `dev`)
    async fn remove(&self, names: &[String], dev: bool) -> MigrationResult<CommandOutput>;

    /// Require packages at their latest compatible versions
    async fn require(&self, names: &[String], dev: bool) -> MigrationResult<CommandOutput>;

    /// Update the whole dependency graph
    async fn update(&self) -> MigrationResult<CommandOutput>;

    /// Names of installed packages that require `name`
    async fn why_depends_on(&self, name: &str) -> MigrationResult<Vec<String>>;

    /// Run a script registered in the manifest
    async fn run_script(&self, script: &str, args: &[String]) -> MigrationResult<CommandOutput>;
}
