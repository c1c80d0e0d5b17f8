//! Step implementations for the modification cycle.
//!
//! Each step reads what it needs from the [`Blackboard`], performs its side
//! effects through the injected collaborator, build runner and change tracker,
//! and returns a [`StepResult`]. Steps never choose what runs next.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::catalogue::{StepCosts, StepKind};
use crate::core::classifier::{BuildExit, RawBuild, classify_build};
use crate::core::conditions::CycleFacts;
use crate::core::names::request_id;
use crate::core::types::{
    BuildResult, CompletionRecord, ModificationReport, ModificationRequest, SoftwareProject,
    StepResult,
};
use crate::io::builder::BuildRunner;
use crate::io::collaborator::{
    Capability, Collaborator, CollaboratorTimeout, PromptRequest, Purpose,
};
use crate::io::config::CoderConfig;
use crate::io::prompt::{PromptEngine, parse_request_reply};
use crate::io::tracker::{ChangeTracker, StorageError};

const FALLBACK_COMMIT_MESSAGE: &str = "Apply requested code modification";

/// Settings a cycle runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    pub max_steps: u32,
    pub step_timeout: Duration,
    pub diagnostic_limit_bytes: usize,
    pub convert_requests: bool,
    pub primary_model: String,
    pub fix_model: String,
    pub directions: String,
    pub costs: StepCosts,
}

impl CycleSettings {
    pub fn from_config(cfg: &CoderConfig) -> Self {
        Self {
            max_steps: cfg.max_steps,
            step_timeout: cfg.step_timeout(),
            diagnostic_limit_bytes: cfg.diagnostic_limit_bytes,
            convert_requests: cfg.convert_requests,
            primary_model: cfg.collaborator.primary_model.clone(),
            fix_model: cfg.collaborator.fix_model.clone(),
            directions: cfg.collaborator.directions.clone(),
            costs: cfg.costs,
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&CoderConfig::default())
    }
}

/// Why a step could not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The working tree could not be read; the cycle must not continue.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The step itself failed; the cycle aborts with this reason.
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        StepError::Failed(err)
    }
}

/// Everything known about the cycle so far.
#[derive(Debug, Clone)]
pub struct Blackboard {
    pub project: SoftwareProject,
    pub user_input: String,
    pub request: Option<ModificationRequest>,
    pub report: Option<ModificationReport>,
    pub last_build: Option<BuildResult>,
    pub completion: Option<CompletionRecord>,
    pub facts: CycleFacts,
}

impl Blackboard {
    pub fn new(project: SoftwareProject, user_input: impl Into<String>) -> Self {
        Self {
            project,
            user_input: user_input.into(),
            request: None,
            report: None,
            last_build: None,
            completion: None,
            facts: CycleFacts::default(),
        }
    }

    fn request(&self) -> Result<&ModificationRequest, StepError> {
        self.request
            .as_ref()
            .ok_or_else(|| StepError::Failed(anyhow::anyhow!("no modification request prepared")))
    }

    fn report(&self) -> Result<&ModificationReport, StepError> {
        self.report
            .as_ref()
            .ok_or_else(|| StepError::Failed(anyhow::anyhow!("no modification report available")))
    }
}

/// Side-effecting services a step may use.
pub struct StepContext<'a> {
    pub settings: &'a CycleSettings,
    pub prompts: &'a PromptEngine,
    pub collaborator: &'a dyn Collaborator,
    pub builder: &'a dyn BuildRunner,
    pub tracker: &'a mut dyn ChangeTracker,
}

impl StepContext<'_> {
    fn prompt(
        &self,
        board: &Blackboard,
        purpose: Purpose,
        model: &str,
        prompt: String,
        capabilities: Vec<Capability>,
    ) -> PromptRequest {
        PromptRequest {
            purpose,
            model: model.to_string(),
            prompt,
            workdir: board.project.root.clone(),
            capabilities,
            timeout: self.settings.step_timeout,
        }
    }
}

/// Run one step, recording its effects on the blackboard.
#[instrument(skip_all, fields(step = %kind))]
pub fn execute_step(
    kind: StepKind,
    ctx: &mut StepContext<'_>,
    board: &mut Blackboard,
) -> Result<StepResult, StepError> {
    match kind {
        StepKind::LoadProject => load_project(board),
        StepKind::ConvertRequest => convert_request(ctx, board),
        StepKind::ModifyProject => modify_project(ctx, board),
        StepKind::Build => build(ctx, board),
        StepKind::BuildWithCollaborator => build_with_collaborator(ctx, board),
        StepKind::FixBrokenBuild => fix_broken_build(ctx, board),
        StepKind::ShareReport => share_report(ctx, board),
    }
}

fn load_project(board: &mut Blackboard) -> Result<StepResult, StepError> {
    let project = &board.project;
    if !project.root.is_dir() {
        return Err(StorageError::MissingRoot(project.root.clone()).into());
    }
    board.facts.project_loaded = true;
    board.facts.build_command_declared = project.declared_build_command().is_some();
    debug!(
        root = %project.root.display(),
        build_command_declared = board.facts.build_command_declared,
        "project loaded"
    );
    Ok(StepResult::Project(project.clone()))
}

fn convert_request(
    ctx: &mut StepContext<'_>,
    board: &mut Blackboard,
) -> Result<StepResult, StepError> {
    let input = board.user_input.trim();
    if input.is_empty() {
        return Err(anyhow::anyhow!("modification request is empty").into());
    }
    let text = if ctx.settings.convert_requests {
        let prompt = ctx.prompts.render_convert_request(&board.project, input)?;
        let request = ctx.prompt(
            board,
            Purpose::ConvertRequest,
            &ctx.settings.primary_model,
            prompt,
            vec![Capability::FileRead],
        );
        let reply = ctx.collaborator.generate(&request)?;
        parse_request_reply(&reply)?
    } else {
        input.to_string()
    };
    let request = ModificationRequest::new(text, request_id(&mut rand::thread_rng()), Utc::now());
    info!(id = %request.id, "modification request prepared");
    board.request = Some(request.clone());
    board.facts.request_prepared = true;
    Ok(StepResult::Request(request))
}

fn modify_project(
    ctx: &mut StepContext<'_>,
    board: &mut Blackboard,
) -> Result<StepResult, StepError> {
    let pending = ctx.tracker.changes()?;
    ctx.tracker.flush()?;
    let request_text = board.request()?.request.clone();
    let prompt = ctx.prompts.render_modify(
        &board.project,
        &request_text,
        &pending,
        &ctx.settings.directions,
    )?;
    let request = ctx.prompt(
        board,
        Purpose::Modify,
        &ctx.settings.primary_model,
        prompt,
        vec![Capability::FileRead, Capability::FileWrite, Capability::WebFetch],
    );
    let reply = ctx.collaborator.generate(&request)?;
    let report = ModificationReport {
        text: reply,
        files_changed: ctx.tracker.changes()?,
    };
    info!(files_changed = report.files_changed.len(), "modification applied");
    board.facts.code_modified = true;
    board.report = Some(report.clone());
    Ok(StepResult::Report(report))
}

fn build(ctx: &mut StepContext<'_>, board: &mut Blackboard) -> Result<StepResult, StepError> {
    let command = board
        .project
        .declared_build_command()
        .ok_or_else(|| anyhow::anyhow!("project declares no build command"))?
        .to_string();
    let start = Instant::now();
    let raw = ctx
        .builder
        .run(&board.project.root, &command, ctx.settings.step_timeout);
    Ok(record_build(ctx, board, &raw, start.elapsed()))
}

fn build_with_collaborator(
    ctx: &mut StepContext<'_>,
    board: &mut Blackboard,
) -> Result<StepResult, StepError> {
    let prompt = ctx.prompts.render_build(&board.project)?;
    let request = ctx.prompt(
        board,
        Purpose::Build,
        &ctx.settings.primary_model,
        prompt,
        vec![Capability::FileRead, Capability::Shell],
    );
    let start = Instant::now();
    let raw = match ctx.collaborator.generate(&request) {
        Ok(transcript) => RawBuild {
            transcript,
            exit: BuildExit::Unreported,
        },
        Err(err) => match err.downcast::<CollaboratorTimeout>() {
            Ok(timeout) => RawBuild {
                transcript: timeout.partial_output,
                exit: BuildExit::TimedOut,
            },
            Err(err) => return Err(err.context("collaborator build").into()),
        },
    };
    Ok(record_build(ctx, board, &raw, start.elapsed()))
}

fn record_build(
    ctx: &StepContext<'_>,
    board: &mut Blackboard,
    raw: &RawBuild,
    elapsed: Duration,
) -> StepResult {
    let result = classify_build(raw, elapsed, ctx.settings.diagnostic_limit_bytes);
    if result.succeeded() {
        info!(elapsed_ms = result.elapsed_ms, "build succeeded");
    } else {
        warn!(failure = ?result.failure, elapsed_ms = result.elapsed_ms, "build failed");
    }
    board.last_build = Some(result.clone());
    StepResult::Build(result)
}

fn fix_broken_build(
    ctx: &mut StepContext<'_>,
    board: &mut Blackboard,
) -> Result<StepResult, StepError> {
    let recent = ctx.tracker.changes()?;
    ctx.tracker.flush()?;
    let diagnostic = board
        .last_build
        .as_ref()
        .map(|build| build.diagnostic.clone())
        .unwrap_or_default();
    let request_text = board.request()?.request.clone();
    let prompt = ctx.prompts.render_fix(
        &board.project,
        &request_text,
        &recent,
        &diagnostic,
        &ctx.settings.directions,
    )?;
    let request = ctx.prompt(
        board,
        Purpose::Fix,
        &ctx.settings.fix_model,
        prompt,
        vec![Capability::FileRead, Capability::FileWrite, Capability::WebFetch],
    );
    let reply = ctx.collaborator.generate(&request)?;
    let fixed = ctx.tracker.changes()?;
    info!(files_changed = fixed.len(), "build fix applied");

    // The fix report supersedes the modify report; the completion carries the last one.
    let report = ModificationReport {
        text: reply,
        files_changed: fixed,
    };
    board.report = Some(report.clone());
    Ok(StepResult::Report(report))
}

fn share_report(
    ctx: &mut StepContext<'_>,
    board: &mut Blackboard,
) -> Result<StepResult, StepError> {
    ctx.tracker.complete()?;
    let request = board.request()?.clone();
    let report = board.report()?.clone();
    let message = suggest_commit_message(ctx, board, &report);
    let completion = CompletionRecord::new(request, report, message, Utc::now());
    info!(
        id = %completion.request.id,
        running_secs = completion.running_time().num_seconds(),
        "cycle complete"
    );
    board.completion = Some(completion.clone());
    board.facts.cycle_closed = true;
    Ok(StepResult::Completion(completion))
}

fn suggest_commit_message(
    ctx: &StepContext<'_>,
    board: &Blackboard,
    report: &ModificationReport,
) -> String {
    let generated = ctx
        .prompts
        .render_commit_message(report)
        .and_then(|prompt| {
            let request = ctx.prompt(
                board,
                Purpose::CommitMessage,
                &ctx.settings.primary_model,
                prompt,
                Vec::new(),
            );
            ctx.collaborator.generate(&request)
        });
    match generated {
        Ok(reply) => match first_line(&reply) {
            Some(line) => return line,
            None => warn!("collaborator returned an empty commit message"),
        },
        Err(err) => warn!(err = %format!("{err:#}"), "commit message generation failed"),
    }
    first_line(&report.text).unwrap_or_else(|| FALLBACK_COMMIT_MESSAGE.to_string())
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_matches('`').trim().to_string())
        .filter(|line| !line.is_empty())
}
