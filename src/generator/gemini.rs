//! Gemini CLI generator.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::process::{run_cli, DEFAULT_TIMEOUT};
use super::{GeneratedText, Generator, PromptTemplate, StageInput};

/// Generator backed by the Gemini CLI.
pub struct GeminiGenerator {
    /// Path to the gemini CLI binary.
    cli_path: String,
    /// Model to use (e.g., "gemini-2.5-flash").
    model: Option<String>,
    template: PromptTemplate,
    timeout: Duration,
}

impl GeminiGenerator {
    /// Creates a generator using the default `gemini` command.
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            cli_path: "gemini".to_string(),
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

    fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args.push("--prompt".to_string());
        args.push(prompt.to_string());

        args
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn invoke(&self, input: &StageInput) -> Result<GeneratedText> {
        let prompt = self.template.render(input)?;
        let args = self.build_args(&prompt);

        tracing::info!(cli = %self.cli_path, model = ?self.model, "invoking Gemini CLI");

        let stdout = run_cli(self.name(), &self.cli_path, &args, None, self.timeout).await?;
        Ok(GeneratedText::Plain(stdout))
    }

    fn name(&self) -> &str {
        "gemini-cli"
    }
}
