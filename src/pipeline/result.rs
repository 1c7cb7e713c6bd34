//! Outcome types for pipeline runs.

use std::time::Duration;

use serde::Serialize;

use crate::error::Error;

use super::context::Context;

/// Terminal status of a run.
#[derive(Debug)]
pub enum RunStatus {
    /// Every stage completed and, where required, was approved.
    CompletedAll,
    /// A human rejected a gated stage's output.
    HaltedByRejection {
        /// Name of the rejected stage.
        stage: String,
        /// Position of the rejected stage in the stage list.
        index: usize,
    },
    /// A stage failed; the error names the stage and index.
    Aborted(Error),
}

impl RunStatus {
    /// Returns a short label for logs and checkpoints.
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::CompletedAll => "completed",
            RunStatus::HaltedByRejection { .. } => "halted",
            RunStatus::Aborted(_) => "aborted",
        }
    }
}

/// What happened to one stage during a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Artifact key the output was written under.
    pub artifact: String,
    /// Whether a human approved the output.
    pub approved: bool,
    /// True when the output was carried over from an earlier run.
    pub skipped: bool,
    /// Time spent generating and approving.
    pub duration: Duration,
}

/// Result of a pipeline run.
///
/// The context holds exactly the stages that fully completed, whatever the
/// status.
#[derive(Debug)]
pub struct PipelineResult {
    /// Identifier of the run.
    pub run_id: String,
    /// The idea the run was started with.
    pub idea: String,
    /// Terminal status.
    pub status: RunStatus,
    /// Outputs of completed stages, in stage order.
    pub context: Context,
    /// One record per completed stage.
    pub records: Vec<StageRecord>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl PipelineResult {
    /// Returns true when every stage completed.
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::CompletedAll)
    }

    /// Returns the rejected stage of a halted run.
    pub fn halted_stage(&self) -> Option<&str> {
        match &self.status {
            RunStatus::HaltedByRejection { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns the error of an aborted run.
    pub fn error(&self) -> Option<&Error> {
        match &self.status {
            RunStatus::Aborted(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the stage at which the run stopped early, if it did.
    pub fn stopped_at(&self) -> Option<&str> {
        match &self.status {
            RunStatus::CompletedAll => None,
            RunStatus::HaltedByRejection { stage, .. } => Some(stage),
            RunStatus::Aborted(err) => err.stage(),
        }
    }

    /// Returns the process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::CompletedAll => crate::cli::exit_codes::SUCCESS,
            RunStatus::HaltedByRejection { .. } => crate::cli::exit_codes::HALTED,
            RunStatus::Aborted(_) => crate::cli::exit_codes::FAILURE,
        }
    }
}
