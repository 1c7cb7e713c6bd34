//! Text generators that back pipeline stages.
//!
//! A [`Generator`] turns a structured [`StageInput`] into raw text. The
//! CLI-backed implementations render a [`PromptTemplate`] and hand the prompt
//! to an external LLM command line tool.

mod claude;
mod command;
mod gemini;
mod process;
mod template;

pub use claude::ClaudeGenerator;
pub use command::CommandGenerator;
pub use gemini::GeminiGenerator;
pub use template::PromptTemplate;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structured input handed to a generator, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInput {
    fields: BTreeMap<String, String>,
}

impl StageInput {
    /// Creates an empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, consuming and returning the input.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets a field.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the input has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Raw output of a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedText {
    /// Bare text.
    Plain(String),
    /// Text carried inside a backend message envelope.
    Message {
        /// Textual content of the message.
        content: String,
    },
}

impl GeneratedText {
    /// Returns the textual content, unwrapping any envelope.
    pub fn text(&self) -> &str {
        match self {
            GeneratedText::Plain(text) => text,
            GeneratedText::Message { content } => content,
        }
    }
}

impl From<String> for GeneratedText {
    fn from(text: String) -> Self {
        GeneratedText::Plain(text)
    }
}

impl From<&str> for GeneratedText {
    fn from(text: &str) -> Self {
        GeneratedText::Plain(text.to_string())
    }
}

/// Capability that produces text for one stage.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates text from the given input.
    async fn invoke(&self, input: &StageInput) -> Result<GeneratedText>;

    /// Returns the name of this generator.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_input_builder_collects_fields() {
        let input = StageInput::new()
            .with("requirements", "a todo app")
            .with("platform", "web");

        assert_eq!(input.len(), 2);
        assert_eq!(input.get("requirements"), Some("a todo app"));
        assert_eq!(input.get("missing"), None);
    }

    #[test]
    fn stage_input_iterates_in_name_order() {
        let input = StageInput::new().with("b", "2").with("a", "1");
        let names: Vec<&str> = input.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn generated_text_unwraps_message() {
        let plain = GeneratedText::from("plain");
        let message = GeneratedText::Message {
            content: "wrapped".to_string(),
        };
        assert_eq!(plain.text(), "plain");
        assert_eq!(message.text(), "wrapped");
    }
}
