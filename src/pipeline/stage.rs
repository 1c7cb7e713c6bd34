//! Stage definitions and input wiring.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::generator::{Generator, StageInput};

use super::context::Context;

/// Default separator for [`InputSource::Joined`].
fn default_separator() -> String {
    "\n\n".to_string()
}

/// Where one stage input field gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum InputSource {
    /// The user's original idea.
    Idea,
    /// Rendered output of an earlier stage.
    Stage {
        /// Name of the earlier stage.
        stage: String,
    },
    /// One member of an earlier fan-out stage.
    Entry {
        /// Name of the fan-out stage.
        stage: String,
        /// Name of the member.
        entry: String,
    },
    /// Outputs of several earlier stages joined together.
    Joined {
        /// Stage names, in join order.
        stages: Vec<String>,
        /// Text placed between outputs.
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// A fixed value.
    Literal {
        /// The value.
        value: String,
    },
}

impl InputSource {
    /// Shorthand for [`InputSource::Stage`].
    pub fn stage(stage: impl Into<String>) -> Self {
        InputSource::Stage {
            stage: stage.into(),
        }
    }

    /// Shorthand for [`InputSource::Literal`].
    pub fn literal(value: impl Into<String>) -> Self {
        InputSource::Literal {
            value: value.into(),
        }
    }

    /// Shorthand for [`InputSource::Joined`] with a blank-line separator.
    pub fn joined<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InputSource::Joined {
            stages: stages.into_iter().map(Into::into).collect(),
            separator: default_separator(),
        }
    }

    /// Returns the stages this source reads from.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            InputSource::Idea | InputSource::Literal { .. } => vec![],
            InputSource::Stage { stage } | InputSource::Entry { stage, .. } => vec![stage],
            InputSource::Joined { stages, .. } => stages.iter().map(String::as_str).collect(),
        }
    }

    /// Resolves the value, or names the missing context entry.
    fn resolve(&self, context: &Context, idea: &str) -> Result<String, String> {
        match self {
            InputSource::Idea => Ok(idea.to_string()),
            InputSource::Literal { value } => Ok(value.clone()),
            InputSource::Stage { stage } => context.text(stage).ok_or_else(|| stage.clone()),
            InputSource::Entry { stage, entry } => context
                .get(stage)
                .and_then(|value| value.entry(entry))
                .map(str::to_string)
                .ok_or_else(|| format!("{}.{}", stage, entry)),
            InputSource::Joined { stages, separator } => {
                let parts = stages
                    .iter()
                    .map(|stage| context.text(stage).ok_or_else(|| stage.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join(separator))
            }
        }
    }
}

/// Builds a stage's generator input from the context and the idea.
///
/// Declarative so that the stages it reads from are known before the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputBuilder {
    bindings: IndexMap<String, InputSource>,
}

impl InputBuilder {
    /// Creates a builder with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a field to a source.
    pub fn bind(mut self, field: impl Into<String>, source: InputSource) -> Self {
        self.bindings.insert(field.into(), source);
        self
    }

    /// Binds a field to the idea.
    pub fn idea(self, field: impl Into<String>) -> Self {
        self.bind(field, InputSource::Idea)
    }

    /// Binds a field to an earlier stage's output.
    pub fn from_stage(self, field: impl Into<String>, stage: impl Into<String>) -> Self {
        self.bind(field, InputSource::stage(stage))
    }

    /// Binds a field to a fixed value.
    pub fn literal(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.bind(field, InputSource::literal(value))
    }

    /// Returns the bound field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Returns the bindings.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &InputSource)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns every stage referenced by any binding, without duplicates.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for source in self.bindings.values() {
            for dep in source.dependencies() {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }

    /// Builds the input. On failure returns the name of the missing entry.
    pub fn build(&self, context: &Context, idea: &str) -> Result<StageInput, String> {
        let mut input = StageInput::new();
        for (field, source) in &self.bindings {
            input.insert(field.clone(), source.resolve(context, idea)?);
        }
        Ok(input)
    }
}

/// One member of a fan-out stage.
#[derive(Clone)]
pub struct FanOutMember {
    /// Member name; key inside the stage's grouped output.
    pub name: String,
    /// Generator producing this member's text.
    pub generator: Arc<dyn Generator>,
}

impl FanOutMember {
    /// Creates a member.
    pub fn new(name: impl Into<String>, generator: Arc<dyn Generator>) -> Self {
        Self {
            name: name.into(),
            generator,
        }
    }
}

/// How a stage produces its output.
#[derive(Clone)]
pub enum StageWork {
    /// One generator call.
    Single(Arc<dyn Generator>),
    /// Independent generators run concurrently over the same input.
    FanOut(Vec<FanOutMember>),
}

/// Immutable description of one pipeline step.
#[derive(Clone)]
pub struct StageDefinition {
    /// Unique stage name; also the context key.
    pub name: String,
    /// Display title for gates and sinks.
    pub title: String,
    /// How the generator input is built.
    pub input: InputBuilder,
    /// What produces the output.
    pub work: StageWork,
    /// Whether a human must approve the output.
    pub requires_approval: bool,
    /// Artifact key the output is persisted under.
    pub artifact: String,
}

impl StageDefinition {
    /// Creates an ungated single-generator stage persisted as `<name>.txt`.
    pub fn new(name: impl Into<String>, generator: Arc<dyn Generator>) -> Self {
        Self::with_work(name, StageWork::Single(generator))
    }

    /// Creates an ungated fan-out stage persisted as `<name>.txt`.
    pub fn fan_out(name: impl Into<String>, members: Vec<FanOutMember>) -> Self {
        Self::with_work(name, StageWork::FanOut(members))
    }

    fn with_work(name: impl Into<String>, work: StageWork) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            artifact: format!("{}.txt", name),
            name,
            input: InputBuilder::new(),
            work,
            requires_approval: false,
        }
    }

    /// Sets the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the input builder.
    pub fn with_input(mut self, input: InputBuilder) -> Self {
        self.input = input;
        self
    }

    /// Sets whether the stage is gated by human approval.
    pub fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Sets the artifact key.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = artifact.into();
        self
    }

    /// Returns true for fan-out stages.
    pub fn is_fan_out(&self) -> bool {
        matches!(self.work, StageWork::FanOut(_))
    }

    /// Returns the fan-out member names, empty for single stages.
    pub fn member_names(&self) -> Vec<&str> {
        match &self.work {
            StageWork::Single(_) => vec![],
            StageWork::FanOut(members) => members.iter().map(|m| m.name.as_str()).collect(),
        }
    }
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let work = match &self.work {
            StageWork::Single(generator) => format!("single({})", generator.name()),
            StageWork::FanOut(_) => format!("fan_out({:?})", self.member_names()),
        };
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("input", &self.input)
            .field("work", &work)
            .field("requires_approval", &self.requires_approval)
            .field("artifact", &self.artifact)
            .finish()
    }
}
