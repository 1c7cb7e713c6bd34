//! Error types for the launchpad pipeline.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Pipeline or stage configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error outside of artifact persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A prompt template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// The generation backend reported a failure.
    #[error("generation backend failed: {0}")]
    Backend(String),

    /// The generation backend did not answer in time.
    #[error("generator '{generator}' timed out after {limit:?}")]
    BackendTimeout { generator: String, limit: Duration },

    /// Writing an artifact to the underlying medium failed.
    #[error("failed to write artifact '{key}': {source}")]
    ArtifactWrite {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Artifact key would escape the store root.
    #[error("invalid artifact key: {0}")]
    InvalidArtifactKey(String),

    /// A context entry was written twice in one run.
    #[error("context already holds an entry for stage '{0}'")]
    ContextConflict(String),

    /// A stage input referenced a context entry that does not exist.
    #[error("stage '{stage}' (#{index}) requires missing context entry '{missing}'")]
    StageInput {
        stage: String,
        index: usize,
        missing: String,
    },

    /// The generator for a stage failed.
    #[error("generation failed at stage '{stage}' (#{index}): {source}")]
    Generation {
        stage: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// One member of a fan-out group failed.
    #[error("fan-out member '{member}' failed: {source}")]
    FanOutMember {
        member: String,
        #[source]
        source: Box<Error>,
    },

    /// Persisting the artifact of a stage failed.
    #[error("persisting stage '{stage}' (#{index}) failed: {source}")]
    Persistence {
        stage: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// The approval gate could not produce a decision.
    #[error("approval for stage '{stage}' (#{index}) failed: {source}")]
    Approval {
        stage: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// No approval decision arrived in time.
    #[error("approval timed out after {0:?}")]
    ApprovalTimeout(Duration),

    /// The approval front end could not read a response.
    #[error("approval input unavailable: {0}")]
    ApprovalInput(String),

    /// Run checkpoint could not be read or written.
    #[error("run state error: {0}")]
    State(String),
}

impl Error {
    /// Returns the stage name for errors raised at a stage boundary.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Error::StageInput { stage, .. }
            | Error::Generation { stage, .. }
            | Error::Persistence { stage, .. }
            | Error::Approval { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns the stage index for errors raised at a stage boundary.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Error::StageInput { index, .. }
            | Error::Generation { index, .. }
            | Error::Persistence { index, .. }
            | Error::Approval { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_expose_location() {
        let err = Error::Generation {
            stage: "backend_code".to_string(),
            index: 2,
            source: Box::new(Error::Backend("quota exceeded".to_string())),
        };

        assert_eq!(err.stage(), Some("backend_code"));
        assert_eq!(err.stage_index(), Some(2));
        let message = err.to_string();
        assert!(message.contains("backend_code"));
        assert!(message.contains("#2"));
        assert!(message.contains("quota exceeded"));
    }

    #[test]
    fn non_stage_errors_have_no_location() {
        let err = Error::Config("empty idea".to_string());
        assert_eq!(err.stage(), None);
        assert_eq!(err.stage_index(), None);
    }

    #[test]
    fn stage_input_error_names_missing_entry() {
        let err = Error::StageInput {
            stage: "test_code".to_string(),
            index: 3,
            missing: "frontend_code".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "stage 'test_code' (#3) requires missing context entry 'frontend_code'"
        );
    }
}
