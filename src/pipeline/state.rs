//! Run checkpoint persistence for explicit resume.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::context::Context;

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// Created, no stage started.
    NotStarted,
    /// Stages are executing.
    InProgress,
    /// Every stage completed.
    CompletedAll,
    /// A gated stage was rejected.
    HaltedByRejection {
        /// Rejected stage.
        stage: String,
    },
    /// A stage failed.
    Aborted {
        /// Failing stage, when known.
        stage: Option<String>,
        /// Error message.
        message: String,
    },
}

impl RunPhase {
    /// Returns true for phases that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::CompletedAll | RunPhase::HaltedByRejection { .. } | RunPhase::Aborted { .. }
        )
    }

    /// Returns true when the run can be continued by a later invocation.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, RunPhase::CompletedAll)
    }
}

/// Persistent state of a run.
///
/// Saved to `.pipeline/run-state.json` under the output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier.
    pub run_id: String,
    /// The idea the run was started with.
    pub idea: String,
    /// Current phase.
    #[serde(flatten)]
    pub phase: RunPhase,
    /// Outputs of completed stages.
    pub context: Context,
    /// ISO 8601 timestamp of the last update.
    pub updated_at: String,
}

impl RunState {
    /// Creates state for a run that has not started.
    pub fn new(run_id: impl Into<String>, idea: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            idea: idea.into(),
            phase: RunPhase::NotStarted,
            context: Context::new(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Returns the checkpoint path within an output directory.
    pub fn state_file_path(output_dir: &Path) -> PathBuf {
        output_dir.join(".pipeline").join("run-state.json")
    }

    /// Moves to a new phase. Terminal phases cannot be left.
    pub fn transition(&mut self, phase: RunPhase) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(Error::State(format!(
                "run {} is already finished ({:?})",
                self.run_id, self.phase
            )));
        }
        if phase == RunPhase::NotStarted {
            return Err(Error::State(format!(
                "run {} cannot return to not-started",
                self.run_id
            )));
        }
        self.phase = phase;
        self.touch();
        Ok(())
    }

    /// Replaces the recorded context.
    pub fn record_context(&mut self, context: &Context) {
        self.context = context.clone();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Writes the state as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::State(format!("failed to serialize state: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads state from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::State(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::State(format!("failed to parse {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn follows_the_run_state_machine() {
        let mut state = RunState::new("run-1", "a todo app");
        assert_eq!(state.phase, RunPhase::NotStarted);

        state.transition(RunPhase::InProgress).unwrap();
        state.transition(RunPhase::InProgress).unwrap();
        state
            .transition(RunPhase::HaltedByRejection {
                stage: "prd".to_string(),
            })
            .unwrap();

        assert!(state.phase.is_terminal());
        assert!(state.phase.is_resumable());
        assert!(state.transition(RunPhase::InProgress).is_err());
    }

    #[test]
    fn cannot_return_to_not_started() {
        let mut state = RunState::new("run-1", "idea");
        state.transition(RunPhase::InProgress).unwrap();
        assert!(matches!(
            state.transition(RunPhase::NotStarted),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn completed_run_is_not_resumable() {
        assert!(!RunPhase::CompletedAll.is_resumable());
        assert!(RunPhase::InProgress.is_resumable());
    }

    #[test]
    fn saves_and_loads_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = RunState::state_file_path(dir.path());

        let mut state = RunState::new("run-1", "a todo app");
        let mut context = Context::new();
        context.insert("user_stories", "As a user...").unwrap();
        state.record_context(&context);
        state
            .transition(RunPhase::Aborted {
                stage: Some("frontend_code".to_string()),
                message: "backend failed".to_string(),
            })
            .unwrap();
        state.save(&path).unwrap();

        assert!(path.ends_with(".pipeline/run-state.json"));
        let loaded = RunState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.context.text("user_stories").as_deref(), Some("As a user..."));
    }

    #[test]
    fn phase_is_flattened_into_json() {
        let mut state = RunState::new("run-1", "idea");
        state
            .transition(RunPhase::HaltedByRejection {
                stage: "prd".to_string(),
            })
            .unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""phase":"halted_by_rejection""#));
        assert!(json.contains(r#""stage":"prd""#));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = RunState::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }
}
