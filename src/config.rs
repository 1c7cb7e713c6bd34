//! Validation of pipeline definitions.
//!
//! Stage lists are checked before a run starts so that wiring mistakes
//! (forward references, duplicate names, unsafe artifact keys) surface as
//! configuration errors instead of mid-run failures.

use std::collections::HashSet;
use std::path::{Component, Path};

use crate::error::{Error, Result};
use crate::pipeline::{InputSource, StageDefinition, StageWork};

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for [StageDefinition] {
    fn validate(&self) -> ValidationResult {
        validate_stages(self)
    }
}

impl Validate for Vec<StageDefinition> {
    fn validate(&self) -> ValidationResult {
        validate_stages(self)
    }
}

/// Returns true if an artifact key stays inside the store root.
pub fn is_safe_artifact_key(key: &str) -> bool {
    !key.trim().is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Checks that a stage list is internally consistent.
///
/// Every stage an input reads from must appear earlier in the list; entry
/// references must name a member of an earlier fan-out stage.
pub fn validate_stages(stages: &[StageDefinition]) -> ValidationResult {
    let mut result = ValidationResult::default();

    if stages.is_empty() {
        result.add_error("pipeline has no stages");
        return result;
    }

    let mut seen: Vec<&StageDefinition> = Vec::new();
    let mut artifacts: HashSet<&str> = HashSet::new();

    for stage in stages {
        let name = stage.name.as_str();

        if name.trim().is_empty() {
            result.add_error("stage name cannot be empty");
        }
        if seen.iter().any(|s| s.name == name) {
            result.add_error(format!("duplicate stage name '{}'", name));
        }

        if !is_safe_artifact_key(&stage.artifact) {
            result.add_error(format!(
                "stage '{}' has invalid artifact key '{}'",
                name, stage.artifact
            ));
        } else if !artifacts.insert(stage.artifact.as_str()) {
            result.add_error(format!(
                "stage '{}' reuses artifact key '{}'",
                name, stage.artifact
            ));
        }

        if let StageWork::FanOut(members) = &stage.work {
            if members.is_empty() {
                result.add_error(format!("fan-out stage '{}' has no members", name));
            }
            let mut member_names = HashSet::new();
            for member in members {
                if !member_names.insert(member.name.as_str()) {
                    result.add_error(format!(
                        "fan-out stage '{}' has duplicate member '{}'",
                        name, member.name
                    ));
                }
            }
        }

        for (field, source) in stage.input.bindings() {
            for dep in source.dependencies() {
                match seen.iter().find(|s| s.name == dep) {
                    Some(earlier) => {
                        if let InputSource::Entry { entry, .. } = source {
                            if !earlier.member_names().contains(&entry.as_str()) {
                                result.add_error(format!(
                                    "stage '{}' field '{}' reads member '{}' which stage '{}' does not produce",
                                    name, field, entry, dep
                                ));
                            }
                        }
                    }
                    None if dep == name => result.add_error(format!(
                        "stage '{}' field '{}' reads its own output",
                        name, field
                    )),
                    None if stages.iter().any(|s| s.name == dep) => {
                        result.add_error(format!(
                            "stage '{}' field '{}' reads stage '{}' which runs later",
                            name, field, dep
                        ))
                    }
                    None => result.add_error(format!(
                        "stage '{}' field '{}' reads unknown stage '{}'",
                        name, field, dep
                    )),
                }
            }
        }

        if stage.input.fields().next().is_none() {
            result.add_warning(format!("stage '{}' has no inputs", name));
        }

        seen.push(stage);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::generator::{GeneratedText, Generator, StageInput};
    use crate::pipeline::{FanOutMember, InputBuilder};

    struct Echo;

    #[async_trait]
    impl Generator for Echo {
        async fn invoke(&self, _input: &StageInput) -> Result<GeneratedText> {
            Ok(GeneratedText::from("echo"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn stage(name: &str) -> StageDefinition {
        StageDefinition::new(name, Arc::new(Echo)).with_input(InputBuilder::new().idea("idea"))
    }

    #[test]
    fn valid_pipeline_passes() {
        let stages = vec![
            stage("prd"),
            stage("user_stories").with_input(InputBuilder::new().from_stage("requirements", "prd")),
        ];
        let result = stages.validate();
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn empty_pipeline_is_invalid() {
        let result = validate_stages(&[]);
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn forward_reference_is_invalid() {
        let stages = vec![
            stage("user_stories").with_input(InputBuilder::new().from_stage("requirements", "prd")),
            stage("prd"),
        ];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("runs later")));
    }

    #[test]
    fn self_reference_is_invalid() {
        let stages =
            vec![stage("docs").with_input(InputBuilder::new().from_stage("code", "docs"))];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("its own output")));
    }

    #[test]
    fn unknown_reference_is_invalid() {
        let stages =
            vec![stage("docs").with_input(InputBuilder::new().from_stage("code", "backend"))];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("unknown stage 'backend'")));
    }

    #[test]
    fn duplicate_names_and_artifacts_are_invalid() {
        let stages = vec![
            stage("prd"),
            stage("prd"),
            stage("other").with_artifact("prd.txt"),
        ];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("duplicate stage name")));
        assert!(result.errors.iter().any(|e| e.contains("reuses artifact key")));
    }

    #[test]
    fn unsafe_artifact_key_is_invalid() {
        let stages = vec![stage("prd").with_artifact("../prd.md")];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("invalid artifact key")));
    }

    #[test]
    fn entry_reference_must_name_a_member() {
        let stages = vec![
            StageDefinition::fan_out(
                "marketing",
                vec![FanOutMember::new("slogan", Arc::new(Echo))],
            )
            .with_input(InputBuilder::new().idea("requirements")),
            stage("launch").with_input(InputBuilder::new().bind(
                "email",
                InputSource::Entry {
                    stage: "marketing".to_string(),
                    entry: "email".to_string(),
                },
            )),
        ];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("member 'email'")));
    }

    #[test]
    fn empty_fan_out_is_invalid() {
        let stages = vec![StageDefinition::fan_out("marketing", vec![])];
        let result = validate_stages(&stages);
        assert!(result.errors.iter().any(|e| e.contains("no members")));
    }

    #[test]
    fn stage_without_inputs_warns() {
        let stages = vec![StageDefinition::new("prd", Arc::new(Echo))];
        let result = validate_stages(&stages);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn into_result_joins_errors() {
        let mut result = ValidationResult::default();
        result.add_error("first");
        result.add_error("second");
        let err = result.into_result().unwrap_err();
        assert_eq!(err.to_string(), "configuration error: first; second");
    }

    #[test]
    fn merge_combines_results() {
        let mut a = ValidationResult::default();
        a.add_warning("w1");
        let mut b = ValidationResult::default();
        b.add_error("e1");
        a.merge(b);
        assert_eq!(a.errors, vec!["e1"]);
        assert_eq!(a.warnings, vec!["w1"]);
    }
}
