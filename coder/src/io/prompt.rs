//! Collaborator prompts and structured reply parsing.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{ModificationReport, SoftwareProject};

const CONVERT_REQUEST_TEMPLATE: &str = include_str!("prompts/convert_request.md");
const MODIFY_TEMPLATE: &str = include_str!("prompts/modify.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const BUILD_TEMPLATE: &str = include_str!("prompts/build.md");
const COMMIT_MESSAGE_TEMPLATE: &str = include_str!("prompts/commit_message.md");

const REQUEST_SCHEMA: &str = include_str!("../../schemas/modification_request.schema.json");

/// Project fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
struct ProjectContext {
    root: String,
    tech: String,
    coding_style: Option<String>,
}

impl ProjectContext {
    fn from_project(project: &SoftwareProject) -> Self {
        Self {
            root: project.root_display(),
            tech: project.tech.trim().to_string(),
            coding_style: project
                .coding_style
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        for (name, source) in [
            ("convert_request", CONVERT_REQUEST_TEMPLATE),
            ("modify", MODIFY_TEMPLATE),
            ("fix", FIX_TEMPLATE),
            ("build", BUILD_TEMPLATE),
            ("commit_message", COMMIT_MESSAGE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt template should be valid");
        }
        Self { env }
    }

    pub fn render_convert_request(&self, project: &SoftwareProject, user_input: &str) -> Result<String> {
        self.render(
            "convert_request",
            context! {
                project => ProjectContext::from_project(project),
                user_input => user_input.trim(),
            },
        )
    }

    /// `pending_changes` are paths changed since the last completed cycle.
    pub fn render_modify(
        &self,
        project: &SoftwareProject,
        request: &str,
        pending_changes: &[String],
        directions: &str,
    ) -> Result<String> {
        self.render(
            "modify",
            context! {
                project => ProjectContext::from_project(project),
                request => request.trim(),
                pending_changes => pending_changes,
                directions => directions.trim(),
            },
        )
    }

    pub fn render_fix(
        &self,
        project: &SoftwareProject,
        request: &str,
        recent_changes: &[String],
        diagnostic: &str,
        directions: &str,
    ) -> Result<String> {
        self.render(
            "fix",
            context! {
                project => ProjectContext::from_project(project),
                request => request.trim(),
                recent_changes => recent_changes,
                diagnostic => diagnostic.trim_end(),
                directions => directions.trim(),
            },
        )
    }

    pub fn render_build(&self, project: &SoftwareProject) -> Result<String> {
        self.render(
            "build",
            context! {
                project => ProjectContext::from_project(project),
            },
        )
    }

    pub fn render_commit_message(&self, report: &ModificationReport) -> Result<String> {
        self.render(
            "commit_message",
            context! {
                report => report.text.trim(),
                files_changed => &report.files_changed,
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load template {name}"))?;
        template
            .render(ctx)
            .with_context(|| format!("render template {name}"))
    }
}

#[derive(Debug, Deserialize)]
struct RequestReply {
    request: String,
}

static REQUEST_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(REQUEST_SCHEMA).expect("bundled request schema should be JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("bundled request schema should compile")
});

/// Extract the instruction from a convert-request reply.
///
/// The reply must contain a JSON object matching the bundled schema; prose or
/// code fences around it are ignored.
pub fn parse_request_reply(reply: &str) -> Result<String> {
    let start = reply
        .find('{')
        .ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let instance: Value =
        serde_json::from_str(&reply[start..=end]).context("parse request reply json")?;
    let messages: Vec<String> = REQUEST_VALIDATOR
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("request reply failed validation:\n- {}", messages.join("\n- "));
    }
    let parsed: RequestReply =
        serde_json::from_value(instance).context("deserialize request reply")?;
    Ok(parsed.request.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> SoftwareProject {
        let mut project = SoftwareProject::new("/work/petclinic").with_tech("Maven, Java");
        project.coding_style = Some("Prefer records.".to_string());
        project
    }

    #[test]
    fn modify_prompt_lists_pending_changes_and_directions() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_modify(
                &project(),
                "add a health endpoint",
                &["src/Main.java".to_string()],
                "Make small edits.",
            )
            .expect("render");
        assert!(prompt.contains("/work/petclinic"));
        assert!(prompt.contains("add a health endpoint"));
        assert!(prompt.contains("- src/Main.java"));
        assert!(prompt.contains("Prefer records."));
        assert!(prompt.contains("Make small edits."));
        assert!(prompt.contains("Do not build the project"));
    }

    #[test]
    fn modify_prompt_omits_empty_sections() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_modify(&SoftwareProject::new("/p"), "do it", &[], "")
            .expect("render");
        assert!(!prompt.contains("Files changed"));
        assert!(!prompt.contains("Technology"));
    }

    #[test]
    fn fix_prompt_carries_diagnostic() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_fix(
                &project(),
                "add a health endpoint",
                &[],
                "build failed (exit code 1)\nerror: missing semicolon",
                "",
            )
            .expect("render");
        assert!(prompt.contains("error: missing semicolon"));
        assert!(prompt.contains("DO NOT BUILD THE PROJECT"));
    }

    #[test]
    fn build_prompt_asks_for_status_line() {
        let prompt = PromptEngine::new().render_build(&project()).expect("render");
        assert!(prompt.contains("BUILD STATUS: SUCCESS"));
    }

    #[test]
    fn parses_request_reply_inside_prose() {
        let reply = "Sure:\n```json\n{\"request\": \"  Add a /health endpoint \"}\n```";
        assert_eq!(
            parse_request_reply(reply).expect("parse"),
            "Add a /health endpoint"
        );
    }

    #[test]
    fn rejects_reply_that_breaks_schema() {
        let err = parse_request_reply("{\"request\": \"   \"}").unwrap_err();
        assert!(err.to_string().contains("validation"));
        let err = parse_request_reply("{\"request\": \"x\", \"extra\": 1}").unwrap_err();
        assert!(err.to_string().contains("validation"));
        assert!(parse_request_reply("no json here").is_err());
    }
}
