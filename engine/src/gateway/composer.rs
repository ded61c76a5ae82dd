//! `composer` command runner

use crate::config::ComposerSettings;
use crate::error::{MigrationError, MigrationResult};
use crate::gateway::{CommandOutput, PackageManagerGateway};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Package manager gateway backed by the composer CLI
pub struct ComposerGateway {
    working_dir: PathBuf,
    binary: String,
    timeout: Duration,
    output_max_bytes: usize,
}

impl ComposerGateway {
    /// Create gateway for a project directory
    pub fn new(working_dir: impl AsRef<Path>, settings: &ComposerSettings) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            binary: settings.binary.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            output_max_bytes: settings.output_max_bytes,
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(self.binary.clone());
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run composer with the configured timeout
    ///
    /// On Unix the child gets its own process group so a timeout takes
    /// down any scripts composer spawned as well.
    async fn run(&self, args: Vec<String>) -> MigrationResult<CommandOutput> {
        let command = self.command_line(&args);
        tracing::info!(command = %command, "Running package manager");

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(&args)
            .current_dir(&self.working_dir)
            .env("COMPOSER_NO_INTERACTION", "1")
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(MigrationError::external(
                    command,
                    None,
                    format!("Failed to execute: {e}"),
                ))
            }
            Err(_) => {
                return Err(MigrationError::external(
                    command,
                    None,
                    format!("Timed out after {}s", self.timeout.as_secs()),
                ))
            }
        };

        let result = CommandOutput {
            command,
            exit_code: output.status.code(),
            stdout: self.truncate(&output.stdout),
            stderr: self.truncate(&output.stderr),
        };
        if !result.success() {
            tracing::debug!(
                command = %result.command,
                exit_code = ?result.exit_code,
                "Package manager returned non-zero"
            );
        }
        Ok(result)
    }

    /// Truncate output to the configured limit on a char boundary
    fn truncate(&self, bytes: &[u8]) -> String {
        let s = String::from_utf8_lossy(bytes);
        if s.len() <= self.output_max_bytes {
            return s.into_owned();
        }
        let mut end = self.output_max_bytes;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...\n[truncated at {} bytes]", &s[..end], s.len())
    }
}

fn args<const N: usize>(fixed: [&str; N]) -> Vec<String> {
    fixed.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl PackageManagerGateway for ComposerGateway {
    async fn install(&self) -> MigrationResult<CommandOutput> {
        self.run(args(["install", "--no-interaction"])).await
    }

    async fn remove(&self, names: &[String], dev: bool) -> MigrationResult<CommandOutput> {
        let mut argv = args(["remove"]);
        if dev {
            argv.push("--dev".to_string());
        }
        argv.extend(names.iter().cloned());
        argv.push("--no-interaction".to_string());
        self.run(argv).await
    }

    async fn require(&self, names: &[String], dev: bool) -> MigrationResult<CommandOutput> {
        let mut argv = args(["require"]);
        if dev {
            argv.push("--dev".to_string());
        }
        argv.extend(names.iter().cloned());
        argv.push("--no-interaction".to_string());
        self.run(argv).await
    }

    async fn update(&self) -> MigrationResult<CommandOutput> {
        self.run(args(["update", "--no-interaction"])).await
    }

    async fn why_depends_on(&self, name: &str) -> MigrationResult<Vec<String>> {
        let output = self.run(args(["why", name])).await?.into_result()?;
        Ok(parse_why_output(&output.stdout))
    }

    async fn run_script(&self, script: &str, script_args: &[String]) -> MigrationResult<CommandOutput> {
        let mut argv = vec![script.to_string()];
        if !script_args.is_empty() {
            argv.push("--".to_string());
            argv.extend(script_args.iter().cloned());
        }
        self.run(argv).await
    }
}

/// First token of every non-empty line of `composer why` output
///
/// Each line reads `<dependent> <version> requires <name> (<constraint>)`.
pub fn parse_why_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_lowercase)
        .collect()
}
