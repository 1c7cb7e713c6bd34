//! Generator that pipes the prompt into an arbitrary command.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::process::{run_cli, DEFAULT_TIMEOUT};
use super::{GeneratedText, Generator, PromptTemplate, StageInput};

/// Generator for local or custom backends, e.g. `ollama run llama3`.
///
/// The rendered prompt is written to stdin and stdout is taken as the reply.
pub struct CommandGenerator {
    argv: Vec<String>,
    template: PromptTemplate,
    timeout: Duration,
}

impl CommandGenerator {
    /// Creates a generator for the given argv.
    pub fn new(argv: Vec<String>, template: PromptTemplate) -> Result<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(Error::Config("command generator needs a program".to_string()));
        }
        Ok(Self {
            argv,
            template,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Sets the invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn invoke(&self, input: &StageInput) -> Result<GeneratedText> {
        let prompt = self.template.render(input)?;
        let stdout = run_cli(
            self.name(),
            &self.argv[0],
            &self.argv[1..],
            Some(&prompt),
            self.timeout,
        )
        .await?;
        Ok(GeneratedText::Plain(stdout))
    }

    fn name(&self) -> &str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_argv_is_rejected() {
        assert!(CommandGenerator::new(vec![], PromptTemplate::new("x")).is_err());
        assert!(CommandGenerator::new(vec![" ".to_string()], PromptTemplate::new("x")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn prompt_goes_through_stdin() {
        let gen = CommandGenerator::new(
            vec!["cat".to_string()],
            PromptTemplate::new("Write tests for:\n{code}"),
        )
        .unwrap();
        let out = gen
            .invoke(&StageInput::new().with("code", "def f(): pass"))
            .await
            .unwrap();
        assert_eq!(out.text(), "Write tests for:\ndef f(): pass");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn oversized_prompt_round_trips_within_timeout() {
        let code = "fn handler() {}\n".repeat(64 * 1024);
        let generator = CommandGenerator::new(vec!["cat".to_string()], PromptTemplate::new("{code}"))
            .unwrap()
            .with_timeout(Duration::from_secs(10));

        let out = generator
            .invoke(&StageInput::new().with("code", code.as_str()))
            .await
            .unwrap();
        assert_eq!(out.text().len(), code.len());
    }
}
