//! Orchestration loop for one request/response cycle.
//!
//! The loop repeatedly evaluates conditions from the last step result, asks
//! the selector for the next step, and runs it, until the terminal step
//! produces a [`CompletionRecord`] or nothing can run. It never blocks for
//! user input mid-cycle.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::catalogue::{StepKind, default_catalogue};
use crate::core::conditions::{ConditionSet, evaluate};
use crate::core::selector::select_step;
use crate::core::types::{BuildResult, CompletionRecord, SoftwareProject, StepResult};
use crate::io::audit::{AuditError, AuditSink};
use crate::io::builder::BuildRunner;
use crate::io::collaborator::Collaborator;
use crate::io::prompt::PromptEngine;
use crate::io::root_lock::RootLock;
use crate::io::tracker::ChangeTracker;
use crate::steps::{Blackboard, CycleSettings, StepContext, StepError, execute_step};

/// Why a cycle stopped without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// No catalogue step is eligible under the current conditions.
    NoEligibleStep,
    /// The cycle ran `max_steps` steps without completing.
    StepLimitExceeded { max_steps: u32 },
    /// A step could not produce a result.
    StepFailed { step: StepKind, message: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::NoEligibleStep => f.write_str("no eligible step"),
            AbortReason::StepLimitExceeded { max_steps } => {
                write!(f, "step limit of {max_steps} exceeded")
            }
            AbortReason::StepFailed { step, message } => write!(f, "{step} failed: {message}"),
        }
    }
}

/// Diagnostic for an aborted cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReport {
    pub reason: AbortReason,
    /// Conditions at the moment the cycle stopped.
    pub conditions: ConditionSet,
    /// The last step that ran, if any.
    pub last_step: Option<StepKind>,
}

impl fmt::Display for AbortReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle aborted: {}", self.reason)?;
        if let Some(step) = self.last_step {
            write!(f, " (last step: {step})")?;
        }
        write!(f, "; conditions: {}", self.conditions)
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStop {
    Done(CompletionRecord),
    Aborted(AbortReport),
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: StepKind,
    pub result: StepResult,
}

/// Result of [`run_cycle`].
#[derive(Debug)]
pub struct CycleOutcome {
    pub stop: CycleStop,
    pub steps: Vec<StepRecord>,
    /// Audit writes that failed; the cycle itself carried on.
    pub audit_errors: Vec<AuditError>,
}

impl CycleOutcome {
    pub fn completion(&self) -> Option<&CompletionRecord> {
        match &self.stop {
            CycleStop::Done(record) => Some(record),
            CycleStop::Aborted(_) => None,
        }
    }

    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|record| record.step).collect()
    }

    /// Build results in the order they were produced.
    pub fn builds(&self) -> Vec<&BuildResult> {
        self.steps
            .iter()
            .filter_map(|record| match &record.result {
                StepResult::Build(build) => Some(build),
                _ => None,
            })
            .collect()
    }
}

/// Services a cycle runs against.
pub struct CycleDeps<'a> {
    pub collaborator: &'a dyn Collaborator,
    pub builder: &'a dyn BuildRunner,
    pub audit: &'a dyn AuditSink,
    pub tracker: &'a mut dyn ChangeTracker,
}

/// Run one request/response cycle for `project`.
///
/// Returns `Err` only for faults the cycle cannot reason about: a busy
/// project root or an unreadable working tree. Everything else ends in
/// [`CycleStop::Done`] or [`CycleStop::Aborted`].
#[instrument(skip_all, fields(root = %project.root.display()))]
pub fn run_cycle(
    project: &SoftwareProject,
    user_input: &str,
    settings: &CycleSettings,
    deps: CycleDeps<'_>,
    mut on_step: impl FnMut(&StepRecord),
) -> Result<CycleOutcome> {
    let _lock = RootLock::acquire(&project.root)?;
    let catalogue = default_catalogue(&settings.costs);
    let prompts = PromptEngine::new();
    let CycleDeps {
        collaborator,
        builder,
        audit,
        tracker,
    } = deps;
    let mut ctx = StepContext {
        settings,
        prompts: &prompts,
        collaborator,
        builder,
        tracker,
    };
    let mut board = Blackboard::new(project.clone(), user_input);
    let mut last: Option<StepResult> = None;
    let mut last_step: Option<StepKind> = None;
    let mut steps = Vec::new();
    let mut audit_errors = Vec::new();
    let mut request_logged = false;

    info!("cycle started");
    loop {
        let conditions = evaluate(last.as_ref(), &board.facts);
        if steps.len() >= settings.max_steps as usize {
            warn!(max_steps = settings.max_steps, "step limit reached");
            return Ok(aborted(
                AbortReason::StepLimitExceeded {
                    max_steps: settings.max_steps,
                },
                conditions,
                last_step,
                steps,
                audit_errors,
            ));
        }
        let Some(step) = select_step(&catalogue, &conditions) else {
            warn!(%conditions, "no eligible step");
            return Ok(aborted(
                AbortReason::NoEligibleStep,
                conditions,
                last_step,
                steps,
                audit_errors,
            ));
        };
        let kind = step.kind;
        debug!(step = %kind, cost = step.cost, %conditions, "step selected");

        if kind == StepKind::ModifyProject && !request_logged {
            if let Some(request) = &board.request {
                record_audit(audit.record_request(request), &mut audit_errors);
                request_logged = true;
            }
        }

        let result = match execute_step(kind, &mut ctx, &mut board) {
            Ok(result) => result,
            Err(StepError::Storage(err)) => {
                return Err(err).with_context(|| format!("{kind} could not read the project"));
            }
            Err(StepError::Failed(err)) => {
                warn!(step = %kind, err = %format!("{err:#}"), "step failed");
                return Ok(aborted(
                    AbortReason::StepFailed {
                        step: kind,
                        message: format!("{err:#}"),
                    },
                    conditions,
                    Some(kind),
                    steps,
                    audit_errors,
                ));
            }
        };

        let record = StepRecord {
            step: kind,
            result: result.clone(),
        };
        on_step(&record);
        steps.push(record);
        last_step = Some(kind);

        if let StepResult::Completion(completion) = &result {
            record_audit(audit.record_completion(completion), &mut audit_errors);
            info!(steps = steps.len(), "cycle done");
            return Ok(CycleOutcome {
                stop: CycleStop::Done(completion.clone()),
                steps,
                audit_errors,
            });
        }
        last = Some(result);
    }
}

fn aborted(
    reason: AbortReason,
    conditions: ConditionSet,
    last_step: Option<StepKind>,
    steps: Vec<StepRecord>,
    audit_errors: Vec<AuditError>,
) -> CycleOutcome {
    CycleOutcome {
        stop: CycleStop::Aborted(AbortReport {
            reason,
            conditions,
            last_step,
        }),
        steps,
        audit_errors,
    }
}

fn record_audit(result: Result<(), AuditError>, errors: &mut Vec<AuditError>) {
    if let Err(err) = result {
        warn!(err = %err, "audit log write failed");
        errors.push(err);
    }
}
