//! Claude Code CLI generator.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::process::{run_cli, DEFAULT_TIMEOUT};
use super::{GeneratedText, Generator, PromptTemplate, StageInput};

/// Generator backed by the Claude Code CLI in print mode.
pub struct ClaudeGenerator {
    /// Path to the claude CLI binary.
    cli_path: String,
    /// Model to use (e.g., "sonnet", "haiku", "opus").
    model: Option<String>,
    /// Prompt rendered from each stage input.
    template: PromptTemplate,
    /// Wall-clock limit for one invocation.
    timeout: Duration,
}

impl ClaudeGenerator {
    /// Creates a generator using the default `claude` command.
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            cli_path: "claude".to_string(),
            model: None,
            template,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets a custom CLI path.
    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = cli_path.into();
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the command arguments for a prompt.
    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args.push("-p".to_string());
        args.push(prompt.to_string());

        args
    }

    /// Extracts the reply from the JSON envelope printed by `--output-format json`.
    ///
    /// Output that is not a JSON envelope is passed through as plain text.
    fn parse_output(&self, stdout: &str) -> Result<GeneratedText> {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(stdout.trim()) else {
            return Ok(GeneratedText::Plain(stdout.to_string()));
        };

        if json.get("is_error").and_then(|v| v.as_bool()) == Some(true) {
            let detail = json
                .get("result")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown error");
            return Err(Error::Backend(format!("claude reported an error: {}", detail)));
        }

        match json.get("result").and_then(|r| r.as_str()) {
            Some(result) => Ok(GeneratedText::Message {
                content: result.to_string(),
            }),
            None => Ok(GeneratedText::Plain(stdout.to_string())),
        }
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn invoke(&self, input: &StageInput) -> Result<GeneratedText> {
        let prompt = self.template.render(input)?;
        let args = self.build_args(&prompt);

        tracing::info!(cli = %self.cli_path, model = ?self.model, "invoking Claude CLI");

        let stdout = run_cli(self.name(), &self.cli_path, &args, None, self.timeout).await?;
        self.parse_output(&stdout)
    }

    fn name(&self) -> &str {
        "claude-code"
    }
}
