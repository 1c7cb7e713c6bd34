//! Declarative pipeline definitions loaded from TOML or YAML.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{validate_stages, Validate, ValidationResult};
use crate::error::{Error, Result};
use crate::generator::{ClaudeGenerator, CommandGenerator, GeminiGenerator, Generator, PromptTemplate};

use super::presets;
use super::stage::{FanOutMember, InputBuilder, StageDefinition};
use super::state::RunState;

/// Which backend produces stage text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// The `claude` CLI.
    #[default]
    Claude,
    /// The `gemini` CLI.
    Gemini,
    /// An arbitrary command reading the prompt on stdin.
    Command,
}

/// Backend settings shared by every stage unless overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Backend kind.
    #[serde(default)]
    pub runner: RunnerKind,
    /// Model passed to the CLI.
    #[serde(default)]
    pub model: Option<String>,
    /// Path to the CLI binary.
    #[serde(default)]
    pub cli_path: Option<String>,
    /// Program and arguments for the `command` runner.
    #[serde(default)]
    pub command: Vec<String>,
    /// Seconds before a generator call is abandoned.
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

fn default_generator_timeout() -> u64 {
    600
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            runner: RunnerKind::default(),
            model: None,
            cli_path: None,
            command: Vec::new(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a generator that renders `template` for each call.
    pub fn create(&self, template: PromptTemplate) -> Result<Arc<dyn Generator>> {
        let timeout = Duration::from_secs(self.timeout_secs);
        let generator: Arc<dyn Generator> = match self.runner {
            RunnerKind::Claude => {
                let mut claude = ClaudeGenerator::new(template).with_timeout(timeout);
                if let Some(path) = &self.cli_path {
                    claude = claude.with_cli_path(path);
                }
                if let Some(model) = &self.model {
                    claude = claude.with_model(model);
                }
                Arc::new(claude)
            }
            RunnerKind::Gemini => {
                let mut gemini = GeminiGenerator::new(template).with_timeout(timeout);
                if let Some(path) = &self.cli_path {
                    gemini = gemini.with_cli_path(path);
                }
                if let Some(model) = &self.model {
                    gemini = gemini.with_model(model);
                }
                Arc::new(gemini)
            }
            RunnerKind::Command => {
                Arc::new(CommandGenerator::new(self.command.clone(), template)?.with_timeout(timeout))
            }
        };
        Ok(generator)
    }
}

impl Validate for GeneratorConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        if self.timeout_secs == 0 {
            result.add_error("generator.timeout_secs must be greater than 0");
        }
        if self.runner == RunnerKind::Command && self.command.is_empty() {
            result.add_error("generator.command is required for the command runner");
        }
        if self.runner != RunnerKind::Command && !self.command.is_empty() {
            result.add_warning("generator.command is ignored unless runner = \"command\"");
        }
        result
    }
}

/// Approval gate settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Approve every gated stage without asking.
    #[serde(default)]
    pub auto_approve: bool,
    /// Seconds to wait for an answer; unset waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ApprovalConfig {
    /// Returns the answer timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// One member of a configured fan-out stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Member name.
    pub name: String,
    /// Prompt for this member.
    pub template: PromptTemplate,
    /// Backend override for this member.
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
}

/// One configured stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name.
    pub name: String,
    /// Display title; defaults to the name.
    #[serde(default)]
    pub title: Option<String>,
    /// Artifact key; defaults to `<name>.txt`.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Whether a human must approve the output.
    #[serde(default)]
    pub requires_approval: bool,
    /// Prompt for single-generator stages.
    #[serde(default)]
    pub template: Option<PromptTemplate>,
    /// Backend override for this stage.
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    /// Input field bindings.
    #[serde(default)]
    pub inputs: InputBuilder,
    /// Members of a fan-out stage.
    #[serde(default)]
    pub fan_out: Vec<FanOutConfig>,
}

impl StageConfig {
    /// Creates a single-generator stage config.
    pub fn new(name: impl Into<String>, template: impl Into<PromptTemplate>) -> Self {
        Self {
            name: name.into(),
            title: None,
            artifact: None,
            requires_approval: false,
            template: Some(template.into()),
            generator: None,
            inputs: InputBuilder::new(),
            fan_out: Vec::new(),
        }
    }

    /// Creates a fan-out stage config.
    pub fn fan_out(name: impl Into<String>, members: Vec<FanOutConfig>) -> Self {
        Self {
            template: None,
            fan_out: members,
            ..Self::new(name, "")
        }
    }

    /// Sets the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the artifact key.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Gates the stage behind human approval.
    pub fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Sets the input bindings.
    pub fn with_inputs(mut self, inputs: InputBuilder) -> Self {
        self.inputs = inputs;
        self
    }

    /// Builds the stage definition, using `default_generator` where the
    /// stage does not override the backend.
    pub fn build(&self, default_generator: &GeneratorConfig) -> Result<StageDefinition> {
        let generator_config = self.generator.as_ref().unwrap_or(default_generator);

        let mut stage = if self.fan_out.is_empty() {
            let template = self.template.clone().ok_or_else(|| {
                Error::Config(format!("stage '{}' has no template", self.name))
            })?;
            StageDefinition::new(&self.name, generator_config.create(template)?)
        } else {
            let members = self
                .fan_out
                .iter()
                .map(|member| {
                    let config = member.generator.as_ref().unwrap_or(generator_config);
                    Ok(FanOutMember::new(
                        &member.name,
                        config.create(member.template.clone())?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            StageDefinition::fan_out(&self.name, members)
        };

        stage = stage
            .with_input(self.inputs.clone())
            .with_approval(self.requires_approval);
        if let Some(title) = &self.title {
            stage = stage.with_title(title);
        }
        if let Some(artifact) = &self.artifact {
            stage = stage.with_artifact(artifact);
        }
        Ok(stage)
    }

    /// Returns every template this stage renders, with a label for messages.
    fn templates(&self) -> Vec<(String, &PromptTemplate)> {
        if self.fan_out.is_empty() {
            self.template
                .iter()
                .map(|t| (format!("stage '{}'", self.name), t))
                .collect()
        } else {
            self.fan_out
                .iter()
                .map(|m| (format!("stage '{}' member '{}'", self.name, m.name), &m.template))
                .collect()
        }
    }
}

impl Validate for StageConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.fan_out.is_empty() && self.template.is_none() {
            result.add_error(format!("stage '{}' has no template", self.name));
        }
        if !self.fan_out.is_empty() && self.template.is_some() {
            result.add_error(format!(
                "stage '{}' sets both template and fan_out",
                self.name
            ));
        }

        let fields: Vec<&str> = self.inputs.fields().collect();
        let mut used: Vec<String> = Vec::new();
        for (label, template) in self.templates() {
            match template.variables() {
                Ok(vars) => {
                    for var in vars {
                        if !fields.contains(&var.as_str()) {
                            result.add_error(format!(
                                "{} uses placeholder '{{{}}}' with no input binding",
                                label, var
                            ));
                        }
                        used.push(var);
                    }
                }
                Err(e) => result.add_error(format!("{}: {}", label, e)),
            }
        }
        for field in fields {
            if !used.iter().any(|u| u == field) {
                result.add_warning(format!(
                    "stage '{}' binds input '{}' that no template uses",
                    self.name, field
                ));
            }
        }

        if let Some(generator) = &self.generator {
            result.merge(generator.validate());
        }
        for member in &self.fan_out {
            if let Some(generator) = &member.generator {
                result.merge(generator.validate());
            }
        }
        result
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory artifacts and the run checkpoint are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Built-in stage list used when `stages` is empty.
    #[serde(default)]
    pub preset: Option<String>,
    /// Default backend.
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Approval settings.
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Custom stage list.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            preset: None,
            generator: GeneratorConfig::default(),
            approval: ApprovalConfig::default(),
            stages: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a `.toml`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        config.map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parses TOML configuration.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Parses YAML configuration.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Returns the run checkpoint path.
    pub fn checkpoint_path(&self) -> PathBuf {
        RunState::state_file_path(&self.output_dir)
    }

    /// Returns the configured stages, or the preset's when none are listed.
    pub fn stage_configs(&self) -> Result<Vec<StageConfig>> {
        if !self.stages.is_empty() {
            return Ok(self.stages.clone());
        }
        let name = self.preset.as_deref().unwrap_or(presets::DEFAULT_PRESET);
        presets::preset(name).ok_or_else(|| {
            Error::Config(format!(
                "unknown preset '{}' (available: {})",
                name,
                presets::PRESET_NAMES.join(", ")
            ))
        })
    }

    /// Validates the configuration and builds the stage list.
    pub fn build_stages(&self) -> Result<Vec<StageDefinition>> {
        for warning in self.validate().into_result()? {
            tracing::warn!(%warning, "configuration warning");
        }
        self.stage_definitions()
    }

    fn stage_definitions(&self) -> Result<Vec<StageDefinition>> {
        self.stage_configs()?
            .iter()
            .map(|stage| stage.build(&self.generator))
            .collect()
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.output_dir.as_os_str().is_empty() {
            result.add_error("output_dir cannot be empty");
        }
        if self.approval.timeout_secs == Some(0) {
            result.add_error("approval.timeout_secs must be greater than 0");
        }
        if !self.stages.is_empty() && self.preset.is_some() {
            result.add_warning("preset is ignored because stages are listed");
        }
        result.merge(self.generator.validate());

        let stages = match self.stage_configs() {
            Ok(stages) => stages,
            Err(e) => {
                result.add_error(e.to_string());
                return result;
            }
        };
        for stage in &stages {
            result.merge(stage.validate());
        }

        // Building only fails on problems already reported above.
        if result.is_valid() {
            match self.stage_definitions() {
                Ok(definitions) => result.merge(validate_stages(&definitions)),
                Err(e) => result.add_error(e.to_string()),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InputSource;
    use tempfile::TempDir;

    const CUSTOM: &str = r#"
output_dir = "out"

[generator]
runner = "gemini"
model = "gemini-2.5-flash"
timeout_secs = 120

[approval]
auto_approve = true

[[stages]]
name = "prd"
title = "Product Requirements"
artifact = "prd.md"
requires_approval = true
template = "Write a PRD for {idea} aimed at {target_user}."
inputs = { idea = { from = "idea" }, target_user = { from = "literal", value = "Startups" } }

[[stages]]
name = "marketing"
artifact = "marketing.md"
inputs = { requirements = { from = "stage", stage = "prd" } }

[[stages.fan_out]]
name = "slogan"
template = "Three slogans for: {requirements}"

[[stages.fan_out]]
name = "email"
template = "A cold email for: {requirements}"
generator = { runner = "command", command = ["cat"] }
"#;

    #[test]
    fn defaults_use_full_build_preset() {
        let config = PipelineConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("build"));
        assert_eq!(config.generator.runner, RunnerKind::Claude);
        assert_eq!(config.generator.timeout_secs, 600);
        assert!(!config.approval.auto_approve);

        let stages = config.build_stages().unwrap();
        assert_eq!(stages.len(), 6);
        assert_eq!(stages[0].name, "user_stories");
    }

    #[test]
    fn parses_custom_stages_from_toml() {
        let config = PipelineConfig::from_toml_str(CUSTOM).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.generator.runner, RunnerKind::Gemini);
        assert!(config.approval.auto_approve);
        assert_eq!(config.stages.len(), 2);
        assert_eq!(
            config.stages[0].inputs.bindings().nth(1),
            Some(("target_user", &InputSource::literal("Startups")))
        );

        let stages = config.build_stages().unwrap();
        assert_eq!(stages[0].title, "Product Requirements");
        assert!(stages[0].requires_approval);
        assert_eq!(stages[1].member_names(), vec!["slogan", "email"]);
        assert_eq!(stages[1].title, "marketing");
    }

    #[test]
    fn parses_yaml() {
        let yaml = r#"
preset: startup
generator:
  runner: command
  command: ["cat"]
approval:
  timeout_secs: 300
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.preset.as_deref(), Some("startup"));
        assert_eq!(config.approval.timeout(), Some(Duration::from_secs(300)));
        assert!(config.build_stages().unwrap().iter().any(|s| s.is_fan_out()));
    }

    #[test]
    fn loads_by_extension() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("pipeline.toml");
        std::fs::write(&toml_path, "output_dir = \"dist\"\n").unwrap();
        let yaml_path = dir.path().join("pipeline.yml");
        std::fs::write(&yaml_path, "output_dir: site\n").unwrap();

        assert_eq!(PipelineConfig::load(&toml_path).unwrap().output_dir, PathBuf::from("dist"));
        assert_eq!(PipelineConfig::load(&yaml_path).unwrap().output_dir, PathBuf::from("site"));
    }

    #[test]
    fn unbound_placeholder_is_an_error() {
        let stage = StageConfig::new("prd", "Write a PRD for {idea} on {platform}")
            .with_inputs(InputBuilder::new().idea("idea"));
        let result = stage.validate();
        assert!(result.errors.iter().any(|e| e.contains("'{platform}'")));
    }

    #[test]
    fn unused_binding_is_a_warning() {
        let stage = StageConfig::new("prd", "Write a PRD for {idea}")
            .with_inputs(InputBuilder::new().idea("idea").literal("platform", "Web"));
        let result = stage.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("'platform'")));
    }

    #[test]
    fn command_runner_requires_argv() {
        let config = GeneratorConfig {
            runner: RunnerKind::Command,
            ..GeneratorConfig::default()
        };
        assert!(!config.validate().is_valid());
        assert!(config.create(PromptTemplate::new("x")).is_err());
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let config = PipelineConfig {
            preset: Some("enterprise".to_string()),
            ..PipelineConfig::default()
        };
        let err = config.build_stages().unwrap_err();
        assert!(err.to_string().contains("unknown preset 'enterprise'"));
    }

    #[test]
    fn forward_reference_in_config_is_an_error() {
        let config = PipelineConfig {
            stages: vec![
                StageConfig::new("docs", "Document {code}")
                    .with_inputs(InputBuilder::new().from_stage("code", "backend")),
                StageConfig::new("backend", "Build {idea}").with_inputs(InputBuilder::new().idea("idea")),
            ],
            ..PipelineConfig::default()
        };
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.contains("runs later")));
    }

    #[test]
    fn zero_approval_timeout_is_an_error() {
        let config = PipelineConfig {
            approval: ApprovalConfig {
                auto_approve: false,
                timeout_secs: Some(0),
            },
            ..PipelineConfig::default()
        };
        assert!(!config.validate().is_valid());
    }
}
