//! Prompt templates with `{field}` placeholders.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::StageInput;

/// A prompt with `{field}` placeholders filled from a [`StageInput`].
///
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    template: String,
}

/// Piece of a parsed template.
enum Segment<'a> {
    Text(&'a str),
    Brace(char),
    Field(&'a str),
}

impl PromptTemplate {
    /// Creates a template from its source text.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns the template source.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns the placeholder names in order of first appearance.
    pub fn variables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for segment in self.parse()? {
            if let Segment::Field(name) = segment {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Renders the template, failing if a placeholder has no input field.
    pub fn render(&self, input: &StageInput) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        for segment in self.parse()? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Brace(c) => out.push(c),
                Segment::Field(name) => {
                    let value = input.get(name).ok_or_else(|| {
                        Error::Template(format!("no input field for placeholder '{{{}}}'", name))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    fn parse(&self) -> Result<Vec<Segment<'_>>> {
        let src = self.template.as_str();
        let mut segments = Vec::new();
        let mut text_start = 0;
        let mut i = 0;
        let bytes = src.as_bytes();

        while i < bytes.len() {
            match bytes[i] {
                b'{' if bytes.get(i + 1) == Some(&b'{') => {
                    segments.push(Segment::Text(&src[text_start..i]));
                    segments.push(Segment::Brace('{'));
                    i += 2;
                    text_start = i;
                }
                b'}' if bytes.get(i + 1) == Some(&b'}') => {
                    segments.push(Segment::Text(&src[text_start..i]));
                    segments.push(Segment::Brace('}'));
                    i += 2;
                    text_start = i;
                }
                b'{' => {
                    let close = src[i + 1..].find('}').ok_or_else(|| {
                        Error::Template(format!("unclosed placeholder at byte {}", i))
                    })?;
                    let name = src[i + 1..i + 1 + close].trim();
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_alphanumeric() || c == '_')
                    {
                        return Err(Error::Template(format!(
                            "invalid placeholder name '{}'",
                            name
                        )));
                    }
                    segments.push(Segment::Text(&src[text_start..i]));
                    segments.push(Segment::Field(name));
                    i += close + 2;
                    text_start = i;
                }
                b'}' => {
                    return Err(Error::Template(format!("unmatched '}}' at byte {}", i)));
                }
                _ => i += 1,
            }
        }
        segments.push(Segment::Text(&src[text_start..]));
        Ok(segments)
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_placeholders() {
        let template = PromptTemplate::new("Write stories for: {requirements}");
        let input = StageInput::new().with("requirements", "a todo app");

        assert_eq!(
            template.render(&input).unwrap(),
            "Write stories for: a todo app"
        );
    }

    #[test]
    fn lists_variables_once_in_order() {
        let template = PromptTemplate::new("{idea} for {target_user} on {platform}, {idea}");
        assert_eq!(
            template.variables().unwrap(),
            vec!["idea", "target_user", "platform"]
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        let template = PromptTemplate::new("Return {{\"slogan\": ...}} for {requirements}");
        let input = StageInput::new().with("requirements", "x");

        assert!(template.variables().unwrap() == vec!["requirements"]);
        assert_eq!(
            template.render(&input).unwrap(),
            "Return {\"slogan\": ...} for x"
        );
    }

    #[test]
    fn missing_field_is_an_error() {
        let template = PromptTemplate::new("Code:\n{code}");
        let err = template.render(&StageInput::new()).unwrap_err();
        assert!(matches!(err, Error::Template(_)));
        assert!(err.to_string().contains("{code}"));
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        let template = PromptTemplate::new("Broken {requirements");
        assert!(template.variables().is_err());
    }

    #[test]
    fn stray_closing_brace_is_an_error() {
        let template = PromptTemplate::new("Broken } here");
        assert!(template.variables().is_err());
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let template = PromptTemplate::new("💡 Idea: {idea} → go");
        let input = StageInput::new().with("idea", "café finder");
        assert_eq!(template.render(&input).unwrap(), "💡 Idea: café finder → go");
    }
}
