//! Command line front end.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::hitl::{ApprovalGate, AutoApprove, ConsoleGate, ConsoleSink};
use crate::pipeline::{
    Context, PipelineConfig, PipelineOrchestrator, PipelineResult, RunState, RunStatus,
    RunnerKind, StageDefinition,
};
use crate::store::FsArtifactStore;

/// Process exit codes.
pub mod exit_codes {
    /// Every stage completed.
    pub const SUCCESS: i32 = 0;
    /// The run aborted or could not start.
    pub const FAILURE: i32 = 1;
    /// A human rejected a stage.
    pub const HALTED: i32 = 2;
}

#[derive(Parser, Debug)]
#[command(
    name = "launchpad",
    version,
    about = "Turn a product idea into reviewed build, docs and launch artifacts"
)]
pub struct Cli {
    /// Product idea; read from stdin when omitted
    pub idea: Vec<String>,

    /// Path to a TOML or YAML pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Built-in stage list (full-build, startup)
    #[arg(long)]
    pub preset: Option<String>,

    /// Directory artifacts are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Generation backend
    #[arg(long, value_enum)]
    pub runner: Option<RunnerKind>,

    /// Model passed to the backend CLI
    #[arg(long)]
    pub model: Option<String>,

    /// Approve every gated stage without asking
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Seconds to wait for each approval answer
    #[arg(long)]
    pub approval_timeout: Option<u64>,

    /// Continue the last halted or aborted run in the output directory
    #[arg(long)]
    pub resume: bool,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Returns the default log filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Loads the configuration file, if any, and applies flag overrides.
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Applies flag overrides to a configuration.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(preset) = &self.preset {
            config.preset = Some(preset.clone());
            config.stages.clear();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(runner) = self.runner {
            config.generator.runner = runner;
        }
        if let Some(model) = &self.model {
            config.generator.model = Some(model.clone());
        }
        if self.yes {
            config.approval.auto_approve = true;
        }
        if let Some(secs) = self.approval_timeout {
            config.approval.timeout_secs = Some(secs);
        }
    }

    /// Returns the idea given on the command line, if any.
    fn idea_arg(&self) -> Option<String> {
        let idea = self.idea.join(" ");
        (!idea.trim().is_empty()).then_some(idea)
    }
}

/// Runs the pipeline and returns the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            exit_codes::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<i32> {
    let config = cli.load_config()?;
    let stages = config.build_stages()?;
    let mut input = BufReader::new(tokio::io::stdin());

    let (idea, seed) = if cli.resume {
        if cli.idea_arg().is_some() {
            tracing::warn!("ignoring idea argument, resuming the saved run");
        }
        load_resume_point(&config)?
    } else {
        let idea = match cli.idea_arg() {
            Some(idea) => idea,
            None => prompt_idea(&mut input, &mut tokio::io::stdout()).await?,
        };
        (idea, Context::new())
    };

    let gate: Box<dyn ApprovalGate> = if config.approval.auto_approve {
        Box::new(AutoApprove)
    } else {
        Box::new(
            ConsoleGate::new(input, tokio::io::stdout()).with_timeout(config.approval.timeout()),
        )
    };

    let orchestrator = PipelineOrchestrator::new(FsArtifactStore::new(&config.output_dir), gate)
        .with_sink(ConsoleSink::new().with_gated(config.approval.auto_approve))
        .with_checkpoint(config.checkpoint_path());

    let result = orchestrator.resume(&idea, &stages, seed).await?;
    print_summary(&result, &stages, &config);
    Ok(result.exit_code())
}

/// Reads the idea and context of the last unfinished run.
fn load_resume_point(config: &PipelineConfig) -> Result<(String, Context)> {
    let path = config.checkpoint_path();
    let state = RunState::load(&path)?;
    if !state.phase.is_resumable() {
        return Err(Error::State(format!(
            "run {} already completed; nothing to resume",
            state.run_id
        )));
    }
    tracing::info!(run_id = %state.run_id, completed = state.context.len(), "resuming run");
    Ok((state.idea, state.context))
}

/// Asks for the idea and reads one line.
async fn prompt_idea<R, W>(reader: &mut R, writer: &mut W) -> Result<String>
where
    R: AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(b"Enter your product idea: ").await?;
    writer.flush().await?;

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let idea = line.trim().to_string();
    if idea.is_empty() {
        return Err(Error::Config("no product idea given".to_string()));
    }
    Ok(idea)
}

fn print_summary(result: &PipelineResult, stages: &[StageDefinition], config: &PipelineConfig) {
    match &result.status {
        RunStatus::CompletedAll => println!("{}", success_banner(result, stages)),
        RunStatus::HaltedByRejection { stage, .. } => eprintln!(
            "\nHalted: '{}' was rejected. Approved outputs are in {}; rerun with --resume to continue.",
            stage,
            config.output_dir.display()
        ),
        RunStatus::Aborted(err) => eprintln!(
            "\nAborted: {}. Completed outputs are in {}; rerun with --resume to continue.",
            err,
            config.output_dir.display()
        ),
    }
}

/// Formats the final report listing every stage's output.
fn success_banner(result: &PipelineResult, stages: &[StageDefinition]) -> String {
    let rule = "=".repeat(60);
    let mut out = format!("\n{}\nAll outputs generated and approved\n{}", rule, rule);
    for stage in stages {
        if let Some(text) = result.context.text(&stage.name) {
            out.push_str(&format!("\n\n--- {} ---\n\n{}", stage.title, text));
        }
    }
    out
}
