//! Built-in stage lists.
//!
//! Presets are plain data. Ordering and gating are choices of the preset,
//! not of the orchestrator.

use super::config::{FanOutConfig, StageConfig};
use super::stage::{InputBuilder, InputSource};

/// Preset used when neither stages nor a preset are configured.
pub const DEFAULT_PRESET: &str = "full-build";

/// Names accepted by [`preset`].
pub const PRESET_NAMES: &[&str] = &["full-build", "startup"];

const USER_STORIES: &str = "You are a product manager. Turn the product requirements below into \
Agile user stories, each in the form 'As a [user], I want to [action], so that [benefit]'.

Requirements:
{requirements}";

const FRONTEND: &str = "You are a senior frontend engineer. Write production-grade React code \
styled with Tailwind CSS for the product requirements below.

Requirements:
{requirements}

Use functional components and hooks, handle basic error states, and return only the code \
for a single file with no explanation.";

const BACKEND: &str = "You are a backend engineer. Write a FastAPI backend with clear route \
definitions and request validation for the product requirements below. Comment the code \
and keep it ready for production.

Requirements:
{requirements}";

const TESTS: &str = "You are a test engineer. Write pytest unit tests for the code below. \
Cover edge cases and make every assertion meaningful.

Code:
{code}";

const DOCS: &str = "You are a technical writer. Document the code below in Markdown, with \
function descriptions, usage examples, and parameter explanations.

Code:
{code}";

const SOCIAL: &str = "You are a social media manager. Write a short LinkedIn post and a short \
Twitter post announcing the product below. Keep them engaging, clear, and focused on benefits.

Product:
{feature}";

const PRD: &str = "You are a seasoned product manager. Write a Product Requirements Document \
with these sections: Product Summary, Target Audience, Problem Statement, Goals and \
Objectives, Key Features, Assumptions, Success Metrics.

Inputs:
- Product idea: {idea}
- Target user: {target_user}
- Platform: {platform}
- Key pain point solved: {pain_point}

Use a structured Markdown layout suited to product and engineering teams.";

const BUSINESS_PLAN: &str = "You are the head of business development at a startup. Write a \
business development plan for the product idea below covering capital requirements and \
funding, fund utilization, partnership opportunities, B2B and B2C growth, monetization, \
market expansion, a milestone timeline, risks with mitigations, success metrics, and ROI \
projections.

Product idea:
{requirements}";

const SALES: &str = "You are the head of sales for a new product. Write a sales plan for the \
product idea below with customer personas, funnel stages, lead generation tactics, inbound \
and outbound channels, a cold email pitch with a call script, and success metrics.

Product idea:
{requirements}";

const EMAIL: &str = "You are an expert email copywriter. Write a compelling cold email that \
attracts potential customers to the product below.

Product:
{requirements}";

const SLOGAN: &str = "You are a branding expert. Write three short, catchy slogans for the \
product idea below.

Product idea:
{requirements}";

const SOCIAL_MEDIA: &str = "You are a social media strategist. Write a LinkedIn post and an \
Instagram post promoting the product below.

Product:
{requirements}";

const VISUAL: &str = "You are a creative director. Describe a concept for a visual \
advertisement (digital banner or social image) for the product below, including theme, \
visual elements, tagline, and layout.

Product:
{requirements}";

/// Returns the stages of a built-in preset.
pub fn preset(name: &str) -> Option<Vec<StageConfig>> {
    match name {
        "full-build" => Some(full_build()),
        "startup" => Some(startup()),
        _ => None,
    }
}

fn requirements_from_idea() -> InputBuilder {
    InputBuilder::new().idea("requirements")
}

fn joined_code() -> InputBuilder {
    InputBuilder::new().bind("code", InputSource::joined(["frontend_code", "backend_code"]))
}

/// Six-stage product build, every stage but the social copy gated.
fn full_build() -> Vec<StageConfig> {
    vec![
        StageConfig::new("user_stories", USER_STORIES)
            .with_title("User Stories")
            .with_artifact("user_stories.md")
            .with_inputs(requirements_from_idea())
            .with_approval(true),
        StageConfig::new("frontend_code", FRONTEND)
            .with_title("Frontend Code")
            .with_artifact("frontend_code.jsx")
            .with_inputs(requirements_from_idea())
            .with_approval(true),
        StageConfig::new("backend_code", BACKEND)
            .with_title("Backend Code")
            .with_artifact("backend_code.py")
            .with_inputs(requirements_from_idea())
            .with_approval(true),
        StageConfig::new("test_code", TESTS)
            .with_title("Test Code")
            .with_artifact("test_code.py")
            .with_inputs(joined_code())
            .with_approval(true),
        StageConfig::new("documentation", DOCS)
            .with_title("Documentation")
            .with_artifact("documentation.md")
            .with_inputs(joined_code())
            .with_approval(true),
        StageConfig::new("social_copy", SOCIAL)
            .with_title("Social Media Copy")
            .with_artifact("social_copy.txt")
            .with_inputs(InputBuilder::new().idea("feature")),
    ]
}

/// Requirements document first, then engineering, business, and a
/// concurrent marketing group.
fn startup() -> Vec<StageConfig> {
    let from_prd = || InputBuilder::new().from_stage("requirements", "prd");
    let member = |name: &str, template: &str| FanOutConfig {
        name: name.to_string(),
        template: template.into(),
        generator: None,
    };

    vec![
        StageConfig::new("prd", PRD)
            .with_title("Product Requirements Document")
            .with_artifact("prd.md")
            .with_inputs(
                InputBuilder::new()
                    .idea("idea")
                    .literal("target_user", "Startups and Solo Builders")
                    .literal("platform", "Web and Mobile")
                    .literal("pain_point", "Users find current tools fragmented or hard to use"),
            )
            .with_approval(true),
        StageConfig::new("user_stories", USER_STORIES)
            .with_title("User Stories")
            .with_artifact("user_stories.md")
            .with_inputs(from_prd()),
        StageConfig::new("frontend_code", FRONTEND)
            .with_title("Frontend Code")
            .with_artifact("frontend_code.jsx")
            .with_inputs(from_prd()),
        StageConfig::new("backend_code", BACKEND)
            .with_title("Backend Code")
            .with_artifact("backend_code.py")
            .with_inputs(from_prd())
            .with_approval(true),
        StageConfig::new("business_plan", BUSINESS_PLAN)
            .with_title("Business Development Plan")
            .with_artifact("business_plan.md")
            .with_inputs(requirements_from_idea()),
        StageConfig::new("sales_strategy", SALES)
            .with_title("Sales Strategy")
            .with_artifact("sales_strategy.md")
            .with_inputs(requirements_from_idea())
            .with_approval(true),
        StageConfig::fan_out(
            "marketing",
            vec![
                member("email", EMAIL),
                member("slogan", SLOGAN),
                member("social_media", SOCIAL_MEDIA),
                member("visual_concept", VISUAL),
            ],
        )
        .with_title("Marketing")
        .with_artifact("marketing.md")
        .with_inputs(requirements_from_idea())
        .with_approval(true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Validate;

    #[test]
    fn every_listed_preset_exists_and_validates() {
        for name in PRESET_NAMES {
            let stages = preset(name).unwrap();
            for stage in &stages {
                let result = stage.validate();
                assert!(result.is_valid(), "{}: {:?}", name, result.errors);
                assert!(result.warnings.is_empty(), "{}: {:?}", name, result.warnings);
            }
        }
        assert!(preset("unknown").is_none());
    }

    #[test]
    fn full_build_gates_all_but_social_copy() {
        let stages = full_build();
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "user_stories",
                "frontend_code",
                "backend_code",
                "test_code",
                "documentation",
                "social_copy"
            ]
        );
        let gated: Vec<bool> = stages.iter().map(|s| s.requires_approval).collect();
        assert_eq!(gated, vec![true, true, true, true, true, false]);
        assert_eq!(stages[2].artifact.as_deref(), Some("backend_code.py"));
    }

    #[test]
    fn startup_ends_with_marketing_fan_out() {
        let stages = startup();
        let marketing = stages.last().unwrap();
        let members: Vec<&str> = marketing.fan_out.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(members, vec!["email", "slogan", "social_media", "visual_concept"]);
        assert!(marketing.template.is_none());
        assert_eq!(stages[0].inputs.fields().count(), 4);
    }
}
