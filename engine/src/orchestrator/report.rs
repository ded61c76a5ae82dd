//! Migration Report: what each stage did
//!
//! Skips and warnings are recorded as such so a rerun over a partially
//! migrated project reads differently from a failure.

use super::state_machine::{MigrationStage, TransitionRecord};
use crate::resolver::TargetPackageSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Done,
    /// Nothing to do (already migrated, optional file absent, no trigger)
    Skipped,
    /// Ran with a non-zero exit that does not stop the migration
    Warning,
    Failed,
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "DONE"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Warning => write!(f, "WARNING"),
            Self::Failed => write!(f, "ERROR"),
        }
    }
}

/// Result of a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: MigrationStage,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    /// Short explanation (skip reason, error message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Output of the external command the stage ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_excerpt: Option<String>,
}

impl StageResult {
    pub fn new(stage: MigrationStage, outcome: StageOutcome) -> Self {
        Self {
            stage,
            outcome,
            duration_ms: 0,
            detail: None,
            output_excerpt: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach command output; blank output is dropped
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.output_excerpt = Some(output);
        }
        self
    }

    /// One console line: `Updating pipeline... DONE (already migrated)`
    pub fn line(&self) -> String {
        let mut line = format!("{}... {}", self.stage.description(), self.outcome);
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" ({detail})"));
        }
        line
    }
}

/// Complete migration report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub timestamp: DateTime<Utc>,
    pub project_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_version: Option<String>,
    pub total_duration_ms: u64,
    pub stages: Vec<StageResult>,
    /// `Done` or `Failed`
    pub final_stage: MigrationStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<MigrationStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<TargetPackageSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionRecord>,
}

impl MigrationReport {
    pub fn new(project_root: String) -> Self {
        Self {
            timestamp: Utc::now(),
            project_root,
            detected_version: None,
            total_duration_ms: 0,
            stages: Vec::new(),
            final_stage: MigrationStage::Start,
            first_failure: None,
            error: None,
            error_code: None,
            suggestion: None,
            packages: None,
            transitions: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, result: StageResult) {
        if result.outcome == StageOutcome::Failed && self.first_failure.is_none() {
            self.first_failure = Some(result.stage);
        }
        self.stages.push(result);
    }

    pub fn finalize(&mut self, final_stage: MigrationStage, total_duration: Duration) {
        self.final_stage = final_stage;
        self.total_duration_ms = total_duration.as_millis() as u64;
    }

    pub fn succeeded(&self) -> bool {
        self.final_stage == MigrationStage::Done
    }

    /// Outcome of `stage`, if it ran
    pub fn outcome(&self, stage: MigrationStage) -> Option<StageOutcome> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| s.outcome)
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        let count = |outcome: StageOutcome| self.stages.iter().filter(|s| s.outcome == outcome).count();
        let mut summary = format!(
            "[{}] {} stages: {} done, {} skipped, {} warnings ({}ms)",
            if self.succeeded() { "MIGRATED" } else { "FAILED" },
            self.stages.len(),
            count(StageOutcome::Done),
            count(StageOutcome::Skipped),
            count(StageOutcome::Warning),
            self.total_duration_ms,
        );
        if let Some(stage) = self.first_failure {
            summary.push_str(&format!(", failed at {stage}"));
        }
        summary
    }
}
