//! Run stage state machine
//!
//! `Init -> Provisioning -> Linking -> VersionCheck -> Migrating
//! -> (CuttingOver) -> Done`, with `Failed` absorbing.

use crate::error::RunError;
use serde::Serialize;

/// Stage of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Configuration and discovery
    Init,
    /// Environment being replaced and created
    Provisioning,
    /// API keys being linked
    Linking,
    /// Version record being read
    VersionCheck,
    /// Migrations being applied
    Migrating,
    /// Alias being switched (primary runs only)
    CuttingOver,
    /// Run finished
    Done,
    /// Run aborted
    Failed,
}

/// Stages reachable from `from`
#[must_use]
pub fn allowed_transitions(from: RunStage) -> Vec<RunStage> {
    use RunStage::*;
    match from {
        Init => vec![Provisioning, Failed],
        Provisioning => vec![Linking, Failed],
        Linking => vec![VersionCheck, Failed],
        VersionCheck => vec![Migrating, Failed],
        Migrating => vec![CuttingOver, Done, Failed],
        CuttingOver => vec![Done],
        Done | Failed => vec![],
    }
}

/// Validate a stage transition
///
/// # Errors
/// `RunError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: RunStage, to: RunStage) -> Result<(), RunError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(RunError::IllegalTransition { from, to })
    }
}

/// Current stage plus the path taken to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTracker {
    history: Vec<RunStage>,
}

impl StageTracker {
    /// Start at `Init`
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: vec![RunStage::Init],
        }
    }

    /// Current stage
    #[inline]
    #[must_use]
    pub fn current(&self) -> RunStage {
        // history always holds Init
        self.history.last().copied().unwrap_or(RunStage::Init)
    }

    /// Stages visited, in order
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[RunStage] {
        &self.history
    }

    /// Move to `to`
    ///
    /// # Errors
    /// `RunError::IllegalTransition` if `to` is not reachable
    pub fn advance(&mut self, to: RunStage) -> Result<(), RunError> {
        validate_transition(self.current(), to)?;
        tracing::debug!("Stage {:?} -> {:?}", self.current(), to);
        self.history.push(to);
        Ok(())
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
