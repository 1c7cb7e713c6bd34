//! Stage pipeline: definitions, execution, checkpoints and presets.

mod config;
mod context;
pub mod presets;
mod result;
mod runner;
mod stage;
mod state;

pub use config::{
    ApprovalConfig, FanOutConfig, GeneratorConfig, PipelineConfig, RunnerKind, StageConfig,
};
pub use context::{Context, StageValue};
pub use result::{PipelineResult, RunStatus, StageRecord};
pub use runner::PipelineOrchestrator;
pub use stage::{FanOutMember, InputBuilder, InputSource, StageDefinition, StageWork};
pub use state::{RunPhase, RunState};
