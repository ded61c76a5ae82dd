//! Migration state machine: explicit stages and legal transition guards.
//!
//! The pipeline is linear. Every run starts at `Start`, walks the stages in
//! order, and ends at `Done` or `Failed`. Any non-terminal stage may fail;
//! nothing is rolled back, so the transition log is what tells the user
//! how far a partial migration got.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The stages of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    Start,
    /// Framework presence, version, source directories.
    Validate,
    /// Compute the target package set.
    Resolve,
    /// Remove packages replaced by substitution rules.
    RemoveObsolete,
    /// Manifest housekeeping, dependant discovery and the package commands.
    ReconcilePackages,
    PatchPipeline,
    PatchRoutes,
    ReplaceEntryPoint,
    ConditionalContainerSwap,
    DelegateInteropMigration,
    DelegateHandlerMigration,
    AutoFixStyle,
    /// Terminal: every stage ran.
    Done,
    /// Terminal: a stage failed hard.
    Failed,
}

impl MigrationStage {
    /// Stages that do work, in execution order.
    pub const PIPELINE: [MigrationStage; 11] = [
        Self::Validate,
        Self::Resolve,
        Self::RemoveObsolete,
        Self::ReconcilePackages,
        Self::PatchPipeline,
        Self::PatchRoutes,
        Self::ReplaceEntryPoint,
        Self::ConditionalContainerSwap,
        Self::DelegateInteropMigration,
        Self::DelegateHandlerMigration,
        Self::AutoFixStyle,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The stage that follows on success.
    pub fn successor(self) -> Option<MigrationStage> {
        use MigrationStage::*;
        match self {
            Start => Some(Validate),
            Validate => Some(Resolve),
            Resolve => Some(RemoveObsolete),
            RemoveObsolete => Some(ReconcilePackages),
            ReconcilePackages => Some(PatchPipeline),
            PatchPipeline => Some(PatchRoutes),
            PatchRoutes => Some(ReplaceEntryPoint),
            ReplaceEntryPoint => Some(ConditionalContainerSwap),
            ConditionalContainerSwap => Some(DelegateInteropMigration),
            DelegateInteropMigration => Some(DelegateHandlerMigration),
            DelegateHandlerMigration => Some(AutoFixStyle),
            AutoFixStyle => Some(Done),
            Done | Failed => None,
        }
    }

    /// What the stage announces when it starts.
    pub fn description(self) -> &'static str {
        match self {
            Self::Start => "Starting migration",
            Self::Validate => "Validating project",
            Self::Resolve => "Resolving package changes",
            Self::RemoveObsolete => "Removing obsolete packages",
            Self::ReconcilePackages => "Updating packages",
            Self::PatchPipeline => "Updating pipeline",
            Self::PatchRoutes => "Updating routes",
            Self::ReplaceEntryPoint => "Replacing entry point",
            Self::ConditionalContainerSwap => "Replacing container configuration",
            Self::DelegateInteropMigration => "Migrating interop middleware",
            Self::DelegateHandlerMigration => "Converting middleware to request handlers",
            Self::AutoFixStyle => "Fixing coding standard",
            Self::Done => "Migration finished",
            Self::Failed => "Migration failed",
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "Start",
            Self::Validate => "Validate",
            Self::Resolve => "Resolve",
            Self::RemoveObsolete => "RemoveObsolete",
            Self::ReconcilePackages => "ReconcilePackages",
            Self::PatchPipeline => "PatchPipeline",
            Self::PatchRoutes => "PatchRoutes",
            Self::ReplaceEntryPoint => "ReplaceEntryPoint",
            Self::ConditionalContainerSwap => "ConditionalContainerSwap",
            Self::DelegateInteropMigration => "DelegateInteropMigration",
            Self::DelegateHandlerMigration => "DelegateHandlerMigration",
            Self::AutoFixStyle => "AutoFixStyle",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Each stage leads to its successor; any non-terminal stage may fail.
fn is_legal_transition(from: MigrationStage, to: MigrationStage) -> bool {
    if to == MigrationStage::Failed {
        return !from.is_terminal();
    }
    from.successor() == Some(to)
}

/// A single recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: MigrationStage,
    pub to: MigrationStage,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: MigrationStage,
    pub to: MigrationStage,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal stage transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current stage and logs every transition.
pub struct MigrationStateMachine {
    current: MigrationStage,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl MigrationStateMachine {
    /// Create a new state machine at `Start`.
    pub fn new() -> Self {
        Self {
            current: MigrationStage::Start,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> MigrationStage {
        self.current
    }

    /// Move to `to` if the transition table allows it.
    pub fn advance(&mut self, to: MigrationStage, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(from = %self.current, to = %to, "Stage transition");

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed`; legal from any non-terminal stage.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(MigrationStage::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Compact history for logging.
    pub fn summary(&self) -> String {
        let stages: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} → {} ({}ms, {} transitions)",
            MigrationStage::Start,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !stages.is_empty() {
            summary.push_str(&format!(" [{}]", stages.join(" → ")));
        }
        summary
    }
}

impl Default for MigrationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
