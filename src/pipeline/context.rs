//! Accumulated outputs of completed stages.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Output of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageValue {
    /// Single text output.
    Text(String),
    /// Named outputs of a fan-out group, in declaration order.
    Group(IndexMap<String, String>),
}

impl StageValue {
    /// Renders the value as one text block.
    ///
    /// Group members become `## name` sections separated by a blank line.
    pub fn render(&self) -> String {
        match self {
            StageValue::Text(text) => text.clone(),
            StageValue::Group(entries) => entries
                .iter()
                .map(|(name, text)| format!("## {}\n\n{}", name, text))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// Returns the text of a single-output stage.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StageValue::Text(text) => Some(text),
            StageValue::Group(_) => None,
        }
    }

    /// Returns one member of a fan-out group.
    pub fn entry(&self, name: &str) -> Option<&str> {
        match self {
            StageValue::Text(_) => None,
            StageValue::Group(entries) => entries.get(name).map(String::as_str),
        }
    }
}

impl From<String> for StageValue {
    fn from(text: String) -> Self {
        StageValue::Text(text)
    }
}

impl From<&str> for StageValue {
    fn from(text: &str) -> Self {
        StageValue::Text(text.to_string())
    }
}

/// Insertion-ordered map from stage name to stage output.
///
/// Entries are write-once: a stage's output cannot be replaced within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: IndexMap<String, StageValue>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the output of a stage.
    pub fn insert(&mut self, stage: impl Into<String>, value: impl Into<StageValue>) -> Result<()> {
        let stage = stage.into();
        if self.entries.contains_key(&stage) {
            return Err(Error::ContextConflict(stage));
        }
        self.entries.insert(stage, value.into());
        Ok(())
    }

    /// Returns the output of a stage.
    pub fn get(&self, stage: &str) -> Option<&StageValue> {
        self.entries.get(stage)
    }

    /// Returns the rendered text of a stage.
    pub fn text(&self, stage: &str) -> Option<String> {
        self.entries.get(stage).map(StageValue::render)
    }

    /// Returns true if the stage has an entry.
    pub fn contains(&self, stage: &str) -> bool {
        self.entries.contains_key(stage)
    }

    /// Returns the stage names in completion order.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over entries in completion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no stage has completed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the context, returning the underlying map.
    pub fn into_inner(self) -> IndexMap<String, StageValue> {
        self.entries
    }
}
