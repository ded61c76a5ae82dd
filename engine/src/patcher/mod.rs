//! Idempotent Configuration Patcher
//!
//! Rewrites configuration scripts into the shape the target release
//! expects using text-level edits only. Every patch operation reads its
//! file once and writes it at most once, atomically. A file that already
//! carries the callable marker is never touched.

pub mod anchor;
pub mod rewrite;
pub mod wrap;

pub use anchor::{insert_after_latest_anchor, AnchorLocator, InsertionLocator, InsertionPoint};
pub use rewrite::rewrite_invocations;
pub use wrap::{wrap_content, Wrapped};

use crate::atomic::write_atomic;
use crate::config::{CallableTemplate, PipelineRules};
use crate::error::{MigrationError, MigrationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Why a patch left a file alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Optional file does not exist
    Missing,
    /// Callable marker already present
    AlreadyWrapped,
    /// No builder statement found to wrap
    NothingToWrap,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "file not found"),
            Self::AlreadyWrapped => write!(f, "already migrated"),
            Self::NothingToWrap => write!(f, "no builder statement to wrap"),
        }
    }
}

/// Outcome of one patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOutcome {
    Applied,
    Skipped(SkipReason),
}

impl PatchOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl std::fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Patches pipeline and route configuration files
pub struct ConfigPatcher {
    template: CallableTemplate,
    rules: PipelineRules,
    locator: Box<dyn InsertionLocator>,
}

impl ConfigPatcher {
    /// Create patcher that locates insertion points by anchor markers
    pub fn new(template: CallableTemplate, rules: PipelineRules) -> Self {
        let locator = Box::new(AnchorLocator::new(rules.anchors.clone()));
        Self {
            template,
            rules,
            locator,
        }
    }

    /// Replace the insertion point lookup
    pub fn with_locator(mut self, locator: impl InsertionLocator + 'static) -> Self {
        self.locator = Box::new(locator);
        self
    }

    /// Read a file that may legitimately be absent
    fn read_optional(path: &Path) -> MigrationResult<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Wrap a configuration script into a callable
    pub fn wrap_as_callable(&self, path: &Path) -> MigrationResult<PatchOutcome> {
        let Some(content) = Self::read_optional(path)? else {
            return Ok(PatchOutcome::Skipped(SkipReason::Missing));
        };
        match wrap_content(&content, &self.template)? {
            Wrapped::Content(wrapped) => {
                write_atomic(path, wrapped)?;
                Ok(PatchOutcome::Applied)
            }
            Wrapped::AlreadyWrapped => Ok(PatchOutcome::Skipped(SkipReason::AlreadyWrapped)),
            Wrapped::NothingToWrap => Ok(PatchOutcome::Skipped(SkipReason::NothingToWrap)),
        }
    }

    /// Wrap, rewrite legacy calls, and insert the new stage
    ///
    /// Nothing is written when the file has no builder statement or no
    /// anchor; both are `NoAnchorFound` carrying the file path.
    pub fn patch_pipeline(&self, path: &Path) -> MigrationResult<PatchOutcome> {
        let Some(content) = Self::read_optional(path)? else {
            return Ok(PatchOutcome::Skipped(SkipReason::Missing));
        };
        let unrecognized = || MigrationError::NoAnchorFound {
            path: path.to_path_buf(),
        };
        let wrapped = match wrap_content(&content, &self.template)? {
            Wrapped::Content(wrapped) => wrapped,
            Wrapped::AlreadyWrapped => return Ok(PatchOutcome::Skipped(SkipReason::AlreadyWrapped)),
            Wrapped::NothingToWrap => return Err(unrecognized()),
        };

        let rewritten = rewrite_invocations(&wrapped, &self.rules.rewrites);
        let patched = insert_after_latest_anchor(
            &rewritten,
            self.locator.as_ref(),
            &self.rules.inserted_stage,
        )
        .ok_or_else(unrecognized)?;

        write_atomic(path, patched)?;
        Ok(PatchOutcome::Applied)
    }

    /// Route files are only wrapped
    pub fn patch_routes(&self, path: &Path) -> MigrationResult<PatchOutcome> {
        self.wrap_as_callable(path)
    }
}
