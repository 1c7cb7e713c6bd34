//! launchpad - human-gated content generation pipeline
//!
//! Runs an ordered list of generation stages over one product idea. Each
//! stage's output is sanitized, optionally approved by a human, persisted as
//! an artifact, and made available to later stages.

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod hitl;
pub mod pipeline;
pub mod sanitize;
pub mod store;

pub use config::{validate_stages, Validate, ValidationResult};
pub use error::{Error, Result};
pub use generator::{GeneratedText, Generator, PromptTemplate, StageInput};
pub use hitl::{ApprovalGate, AutoApprove, ConsoleGate, ConsoleSink, Decision, NullSink, OutputSink};
pub use pipeline::{
    Context, FanOutMember, InputBuilder, InputSource, PipelineConfig, PipelineOrchestrator,
    PipelineResult, RunStatus, StageDefinition, StageValue,
};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
