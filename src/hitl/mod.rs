//! Human-in-the-loop front ends.
//!
//! The orchestrator talks to people through two seams: an [`ApprovalGate`]
//! that accepts or rejects a stage's output, and an [`OutputSink`] that shows
//! progress. Neither knows how the other is rendered.

mod console;

pub use console::{ConsoleGate, ConsoleSink};

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the output and continue.
    Approve,
    /// Discard the output and halt the run.
    Reject,
}

impl Decision {
    /// Returns true for [`Decision::Approve`].
    pub fn is_approved(self) -> bool {
        self == Decision::Approve
    }
}

impl From<bool> for Decision {
    fn from(approved: bool) -> Self {
        if approved {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }
}

/// Presents a titled artifact to a human and waits for a decision.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Shows `content` under `title` and blocks until a decision is made.
    async fn ask(&self, title: &str, content: &str) -> Result<Decision>;
}

#[async_trait]
impl<T: ApprovalGate + ?Sized> ApprovalGate for Box<T> {
    async fn ask(&self, title: &str, content: &str) -> Result<Decision> {
        (**self).ask(title, content).await
    }
}

/// Gate that approves everything without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn ask(&self, title: &str, _content: &str) -> Result<Decision> {
        tracing::info!(title, "auto-approving stage output");
        Ok(Decision::Approve)
    }
}

/// Receives progress and stage output for display.
pub trait OutputSink: Send + Sync {
    /// Called before a stage starts generating.
    fn stage_started(&self, _index: usize, _total: usize, _title: &str) {}

    /// Called with the sanitized output of a stage.
    ///
    /// `gated` is true when the same content is about to be shown by the
    /// approval gate.
    fn stage_output(&self, title: &str, content: &str, gated: bool);

    /// Called for stages whose output was carried over from an earlier run.
    fn stage_skipped(&self, _title: &str) {}
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn stage_output(&self, _title: &str, _content: &str, _gated: bool) {}
}
