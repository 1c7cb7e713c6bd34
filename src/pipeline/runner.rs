//! Sequential stage execution with approval gates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tokio::task::JoinSet;

use crate::config::validate_stages;
use crate::error::{Error, Result};
use crate::generator::StageInput;
use crate::hitl::{ApprovalGate, NullSink, OutputSink};
use crate::sanitize;
use crate::store::ArtifactStore;

use super::context::{Context, StageValue};
use super::result::{PipelineResult, RunStatus, StageRecord};
use super::stage::{FanOutMember, StageDefinition, StageWork};
use super::state::{RunPhase, RunState};

/// How one stage ended.
enum StageOutcome {
    /// Output persisted; ready to enter the context.
    Completed { value: StageValue, approved: bool },
    /// A human rejected the output.
    Rejected,
}

/// Runs an ordered list of stages against one idea.
///
/// Stages run strictly one after another. A stage's output enters the
/// context only after it was generated, sanitized, approved when gated, and
/// persisted. The only concurrency is inside a fan-out stage.
pub struct PipelineOrchestrator<S: ArtifactStore, G: ApprovalGate> {
    store: S,
    gate: G,
    sink: Box<dyn OutputSink>,
    checkpoint: Option<PathBuf>,
}

impl<S: ArtifactStore, G: ApprovalGate> PipelineOrchestrator<S, G> {
    /// Creates an orchestrator that shows nothing and writes no checkpoint.
    pub fn new(store: S, gate: G) -> Self {
        Self {
            store,
            gate,
            sink: Box::new(NullSink),
            checkpoint: None,
        }
    }

    /// Sets where progress and ungated output are shown.
    pub fn with_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Writes a run checkpoint to `path` after every stage.
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    /// Returns the artifact store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the approval gate.
    pub fn gate(&self) -> &G {
        &self.gate
    }

    /// Runs every stage from the beginning.
    ///
    /// Returns `Err` only when the run cannot start: an empty idea or an
    /// inconsistent stage list. Halts and aborts are reported in the result.
    pub async fn run(&self, idea: &str, stages: &[StageDefinition]) -> Result<PipelineResult> {
        self.resume(idea, stages, Context::new()).await
    }

    /// Runs the stages not already present in `seed`.
    ///
    /// Seeded stages must be a prefix of the stage list. They are reported
    /// as skipped and are neither regenerated nor persisted again.
    pub async fn resume(
        &self,
        idea: &str,
        stages: &[StageDefinition],
        seed: Context,
    ) -> Result<PipelineResult> {
        if idea.trim().is_empty() {
            return Err(Error::Config("idea cannot be empty".to_string()));
        }
        for warning in validate_stages(stages).into_result()? {
            tracing::warn!(%warning, "stage list warning");
        }
        check_seed(&seed, stages)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let total = stages.len();
        let skip = seed.len();

        tracing::info!(run_id = %run_id, stages = total, resumed = skip, "starting pipeline run");

        let mut state = RunState::new(&run_id, idea);
        state.record_context(&seed);
        self.advance(&mut state, RunPhase::InProgress);

        let mut context = seed;
        let mut records = Vec::with_capacity(total);
        let mut status = RunStatus::CompletedAll;

        for (index, stage) in stages.iter().enumerate() {
            if index < skip {
                tracing::info!(stage = %stage.name, index, "stage carried over");
                self.sink.stage_skipped(&stage.title);
                records.push(StageRecord {
                    stage: stage.name.clone(),
                    artifact: stage.artifact.clone(),
                    approved: stage.requires_approval,
                    skipped: true,
                    duration: std::time::Duration::ZERO,
                });
                continue;
            }

            self.sink.stage_started(index, total, &stage.title);
            tracing::info!(run_id = %run_id, stage = %stage.name, index, "stage started");
            let stage_started = Instant::now();

            let outcome = match self.execute_stage(index, stage, idea, &context).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(stage = %stage.name, index, error = %err, "run aborted");
                    status = RunStatus::Aborted(err);
                    break;
                }
            };

            match outcome {
                StageOutcome::Rejected => {
                    tracing::warn!(stage = %stage.name, index, "stage rejected, halting run");
                    status = RunStatus::HaltedByRejection {
                        stage: stage.name.clone(),
                        index,
                    };
                    break;
                }
                StageOutcome::Completed { value, approved } => {
                    if let Err(err) = context.insert(stage.name.clone(), value) {
                        status = RunStatus::Aborted(Error::Persistence {
                            stage: stage.name.clone(),
                            index,
                            source: Box::new(err),
                        });
                        break;
                    }
                    records.push(StageRecord {
                        stage: stage.name.clone(),
                        artifact: stage.artifact.clone(),
                        approved,
                        skipped: false,
                        duration: stage_started.elapsed(),
                    });
                    state.record_context(&context);
                    self.advance(&mut state, RunPhase::InProgress);
                    tracing::info!(
                        stage = %stage.name,
                        index,
                        elapsed_ms = stage_started.elapsed().as_millis() as u64,
                        "stage completed"
                    );
                }
            }
        }

        self.advance(&mut state, terminal_phase(&status));
        tracing::info!(run_id = %run_id, status = status.label(), completed = context.len(), "pipeline run finished");

        Ok(PipelineResult {
            run_id,
            idea: idea.to_string(),
            status,
            context,
            records,
            duration: started.elapsed(),
        })
    }

    async fn execute_stage(
        &self,
        index: usize,
        stage: &StageDefinition,
        idea: &str,
        context: &Context,
    ) -> Result<StageOutcome> {
        if context.contains(&stage.name) {
            return Err(Error::Persistence {
                stage: stage.name.clone(),
                index,
                source: Box::new(Error::ContextConflict(stage.name.clone())),
            });
        }

        let input = stage
            .input
            .build(context, idea)
            .map_err(|missing| Error::StageInput {
                stage: stage.name.clone(),
                index,
                missing,
            })?;

        let value = generate(stage, input)
            .await
            .map_err(|source| Error::Generation {
                stage: stage.name.clone(),
                index,
                source: Box::new(source),
            })?;
        let rendered = value.render();

        self.sink
            .stage_output(&stage.title, &rendered, stage.requires_approval);

        if stage.requires_approval {
            let decision = self
                .gate
                .ask(&stage.title, &rendered)
                .await
                .map_err(|source| Error::Approval {
                    stage: stage.name.clone(),
                    index,
                    source: Box::new(source),
                })?;
            if !decision.is_approved() {
                return Ok(StageOutcome::Rejected);
            }
        }

        self.store
            .write(&stage.artifact, &rendered)
            .map_err(|source| Error::Persistence {
                stage: stage.name.clone(),
                index,
                source: Box::new(source),
            })?;

        Ok(StageOutcome::Completed {
            value,
            approved: stage.requires_approval,
        })
    }

    /// Moves the checkpoint to `phase` and saves it. Save failures are logged.
    fn advance(&self, state: &mut RunState, phase: RunPhase) {
        if let Err(err) = state.transition(phase) {
            tracing::warn!(error = %err, "ignoring run state transition");
            return;
        }
        let Some(path) = &self.checkpoint else {
            return;
        };
        if let Err(err) = state.save(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to write run checkpoint");
        }
    }
}

/// Checks that seeded entries are exactly the leading stages.
fn check_seed(seed: &Context, stages: &[StageDefinition]) -> Result<()> {
    if seed.len() > stages.len() {
        return Err(Error::Config(format!(
            "resume context has {} entries but the pipeline has {} stages",
            seed.len(),
            stages.len()
        )));
    }
    for (seeded, stage) in seed.stages().zip(stages) {
        if seeded != stage.name {
            return Err(Error::Config(format!(
                "resume context entry '{}' does not match stage '{}'",
                seeded, stage.name
            )));
        }
    }
    Ok(())
}

fn terminal_phase(status: &RunStatus) -> RunPhase {
    match status {
        RunStatus::CompletedAll => RunPhase::CompletedAll,
        RunStatus::HaltedByRejection { stage, .. } => RunPhase::HaltedByRejection {
            stage: stage.clone(),
        },
        RunStatus::Aborted(err) => RunPhase::Aborted {
            stage: err.stage().map(str::to_string),
            message: err.to_string(),
        },
    }
}

/// Produces the sanitized output of a stage.
async fn generate(stage: &StageDefinition, input: StageInput) -> Result<StageValue> {
    match &stage.work {
        StageWork::Single(generator) => {
            tracing::debug!(stage = %stage.name, generator = generator.name(), "invoking generator");
            let raw = generator.invoke(&input).await?;
            Ok(StageValue::Text(sanitize::clean(&raw)))
        }
        StageWork::FanOut(members) => fan_out(members, input).await.map(StageValue::Group),
    }
}

/// Runs every member concurrently over the same input and joins the results
/// in member order. The first failure cancels the members still running.
async fn fan_out(members: &[FanOutMember], input: StageInput) -> Result<IndexMap<String, String>> {
    let input = Arc::new(input);
    let mut tasks = JoinSet::new();

    for (slot, member) in members.iter().enumerate() {
        let generator = Arc::clone(&member.generator);
        let input = Arc::clone(&input);
        tracing::debug!(member = %member.name, generator = generator.name(), "spawning fan-out member");
        tasks.spawn(async move { (slot, generator.invoke(&input).await) });
    }

    let mut outputs: Vec<Option<String>> = vec![None; members.len()];
    while let Some(joined) = tasks.join_next().await {
        let (slot, result) = match joined {
            Ok(done) => done,
            Err(join_err) => {
                tasks.abort_all();
                let pending: Vec<&str> = members
                    .iter()
                    .zip(&outputs)
                    .filter(|(_, out)| out.is_none())
                    .map(|(m, _)| m.name.as_str())
                    .collect();
                return Err(Error::FanOutMember {
                    member: pending.join(","),
                    source: Box::new(Error::Backend(format!("task failed: {}", join_err))),
                });
            }
        };
        match result {
            Ok(raw) => outputs[slot] = Some(sanitize::clean(&raw)),
            Err(err) => {
                tasks.abort_all();
                return Err(Error::FanOutMember {
                    member: members[slot].name.clone(),
                    source: Box::new(err),
                });
            }
        }
    }

    members
        .iter()
        .zip(outputs)
        .map(|(member, output)| {
            output
                .map(|text| (member.name.clone(), text))
                .ok_or_else(|| Error::FanOutMember {
                    member: member.name.clone(),
                    source: Box::new(Error::Backend("member produced no output".to_string())),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::generator::{GeneratedText, Generator};
    use crate::hitl::AutoApprove;
    use crate::pipeline::InputBuilder;
    use crate::store::MemoryArtifactStore;

    struct Fixed {
        text: &'static str,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(text: &'static str) -> Arc<Self> {
            Self::delayed(text, Duration::ZERO)
        }

        fn delayed(text: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                text,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Generator for Fixed {
        async fn invoke(&self, _input: &StageInput) -> Result<GeneratedText> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(GeneratedText::from(self.text))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Failing;

    #[async_trait]
    impl Generator for Failing {
        async fn invoke(&self, _input: &StageInput) -> Result<GeneratedText> {
            Err(Error::Backend("quota exceeded".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn orchestrator() -> PipelineOrchestrator<MemoryArtifactStore, AutoApprove> {
        PipelineOrchestrator::new(MemoryArtifactStore::new(), AutoApprove)
    }

    #[tokio::test]
    async fn fan_out_joins_in_member_order() {
        let stage = StageDefinition::fan_out(
            "marketing",
            vec![
                FanOutMember::new("email", Fixed::delayed("Hi", Duration::from_millis(30))),
                FanOutMember::new("slogan", Fixed::new("```\nShip it\n```")),
            ],
        )
        .with_input(InputBuilder::new().idea("requirements"))
        .with_artifact("marketing.md");

        let result = orchestrator().run("a todo app", &[stage]).await.unwrap();

        assert!(result.is_success());
        let value = result.context.get("marketing").unwrap();
        assert_eq!(value.entry("email"), Some("Hi"));
        assert_eq!(value.entry("slogan"), Some("Ship it"));
        assert_eq!(value.render(), "## email\n\nHi\n\n## slogan\n\nShip it");
    }

    #[tokio::test]
    async fn stage_already_in_context_is_refused_before_work() {
        let fixed = Fixed::new("again");
        let stage = StageDefinition::new("prd", fixed.clone()).with_artifact("prd.md");
        let mut context = Context::new();
        context.insert("prd", "first").unwrap();

        let orchestrator = orchestrator();
        let err = match orchestrator.execute_stage(3, &stage, "idea", &context).await {
            Err(err) => err,
            Ok(_) => panic!("stage should be refused"),
        };

        assert_eq!(err.stage(), Some("prd"));
        assert_eq!(err.stage_index(), Some(3));
        assert!(matches!(
            err,
            Error::Persistence { ref source, .. } if matches!(**source, Error::ContextConflict(_))
        ));
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
        assert!(orchestrator.store().write_log().is_empty());
    }

    #[tokio::test]
    async fn fan_out_member_failure_aborts_stage() {
        let slow = Fixed::delayed("late", Duration::from_millis(20));
        let stage = StageDefinition::fan_out(
            "marketing",
            vec![
                FanOutMember::new("email", slow.clone()),
                FanOutMember::new("slogan", Arc::new(Failing)),
            ],
        );

        let orchestrator = orchestrator();
        let result = orchestrator.run("a todo app", &[stage]).await.unwrap();

        let err = result.error().unwrap();
        assert_eq!(err.stage(), Some("marketing"));
        assert!(err.to_string().contains("fan-out member 'slogan' failed"));
        assert!(result.context.is_empty());
        assert!(orchestrator.store().write_log().is_empty());
    }

    #[tokio::test]
    async fn empty_idea_is_rejected_before_running() {
        let fixed = Fixed::new("x");
        let stages = vec![StageDefinition::new("prd", fixed.clone())];
        let err = orchestrator().run("   ", &stages).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inconsistent_stage_list_is_rejected_before_running() {
        let fixed = Fixed::new("x");
        let stages = vec![
            StageDefinition::new("user_stories", fixed.clone())
                .with_input(InputBuilder::new().from_stage("requirements", "prd")),
            StageDefinition::new("prd", fixed.clone()),
        ];
        let err = orchestrator().run("idea", &stages).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resume_skips_seeded_stages() {
        let first = Fixed::new("first");
        let second = Fixed::new("second");
        let stages = vec![
            StageDefinition::new("prd", first.clone()).with_input(InputBuilder::new().idea("idea")),
            StageDefinition::new("user_stories", second.clone())
                .with_input(InputBuilder::new().from_stage("requirements", "prd")),
        ];
        let mut seed = Context::new();
        seed.insert("prd", "approved earlier").unwrap();

        let orchestrator = orchestrator();
        let result = orchestrator.resume("idea", &stages, seed).await.unwrap();

        assert!(result.is_success());
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.store().write_log(), vec!["user_stories.txt"]);
        assert!(result.records[0].skipped);
        assert_eq!(result.context.text("prd").as_deref(), Some("approved earlier"));
    }

    #[tokio::test]
    async fn resume_rejects_seed_out_of_order() {
        let stages = vec![
            StageDefinition::new("prd", Fixed::new("a")),
            StageDefinition::new("user_stories", Fixed::new("b")),
        ];
        let mut seed = Context::new();
        seed.insert("user_stories", "x").unwrap();

        let err = orchestrator().resume("idea", &stages, seed).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn writes_checkpoint_with_terminal_phase() {
        let dir = TempDir::new().unwrap();
        let path = RunState::state_file_path(dir.path());
        let stages = vec![
            StageDefinition::new("prd", Fixed::new("doc")).with_input(InputBuilder::new().idea("idea")),
            StageDefinition::new("user_stories", Arc::new(Failing))
                .with_input(InputBuilder::new().from_stage("requirements", "prd")),
        ];

        let orchestrator = orchestrator().with_checkpoint(&path);
        let result = orchestrator.run("idea", &stages).await.unwrap();

        let state = RunState::load(&path).unwrap();
        assert_eq!(state.run_id, result.run_id);
        assert_eq!(state.context, result.context);
        assert!(matches!(
            state.phase,
            RunPhase::Aborted { stage: Some(ref s), .. } if s == "user_stories"
        ));
    }
}
