//! Condition evaluation over the most recent step result.
//!
//! Every condition kind always has a value: a [`ConditionSet`] is a total map
//! from [`Condition`] to `bool`, so a misspelled condition cannot silently read
//! as false.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::core::types::StepResult;

/// Closed set of conditions the step selector reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The last result was a modification report, or a freshly created project.
    BuildNeeded,
    /// The last result was a build result (any verdict).
    BuildWasLastAction,
    /// The last result was a successful build.
    BuildSucceeded,
    /// The last result was a failed build.
    BuildFailed,
    ProjectLoaded,
    RequestPrepared,
    CodeModified,
    /// The project declares a non-blank build command.
    BuildCommandDeclared,
    /// A completion record closed the cycle.
    CycleClosed,
}

impl Condition {
    pub const ALL: [Condition; 9] = [
        Condition::BuildNeeded,
        Condition::BuildWasLastAction,
        Condition::BuildSucceeded,
        Condition::BuildFailed,
        Condition::ProjectLoaded,
        Condition::RequestPrepared,
        Condition::CodeModified,
        Condition::BuildCommandDeclared,
        Condition::CycleClosed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::BuildNeeded => "build_needed",
            Condition::BuildWasLastAction => "build_was_last_action",
            Condition::BuildSucceeded => "build_succeeded",
            Condition::BuildFailed => "build_failed",
            Condition::ProjectLoaded => "project_loaded",
            Condition::RequestPrepared => "request_prepared",
            Condition::CodeModified => "code_modified",
            Condition::BuildCommandDeclared => "build_command_declared",
            Condition::CycleClosed => "cycle_closed",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts accumulated over the current cycle, independent of the last result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleFacts {
    pub project_loaded: bool,
    pub request_prepared: bool,
    pub code_modified: bool,
    pub build_command_declared: bool,
    pub cycle_closed: bool,
}

/// Truth value of every condition at one point in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionSet {
    values: BTreeMap<Condition, bool>,
}

impl ConditionSet {
    /// All conditions false.
    pub fn new() -> Self {
        Self {
            values: Condition::ALL.iter().map(|c| (*c, false)).collect(),
        }
    }

    pub fn get(&self, condition: Condition) -> bool {
        self.values.get(&condition).copied().unwrap_or(false)
    }

    pub fn set(&mut self, condition: Condition, value: bool) {
        self.values.insert(condition, value);
    }

    pub fn with(mut self, condition: Condition, value: bool) -> Self {
        self.set(condition, value);
        self
    }

    /// Conditions currently true, in declaration order.
    pub fn true_conditions(&self) -> Vec<Condition> {
        self.values
            .iter()
            .filter(|(_, value)| **value)
            .map(|(condition, _)| *condition)
            .collect()
    }
}

impl Default for ConditionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .values
            .iter()
            .map(|(condition, value)| format!("{condition}={value}"))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

pub fn build_needed(last: Option<&StepResult>) -> bool {
    match last {
        Some(StepResult::Report(_)) => true,
        Some(StepResult::Project(project)) => project.was_created,
        _ => false,
    }
}

pub fn build_was_last_action(last: Option<&StepResult>) -> bool {
    matches!(last, Some(StepResult::Build(_)))
}

pub fn build_succeeded(last: Option<&StepResult>) -> bool {
    matches!(last, Some(StepResult::Build(build)) if build.succeeded())
}

pub fn build_failed(last: Option<&StepResult>) -> bool {
    matches!(last, Some(StepResult::Build(build)) if build.failed())
}

/// Evaluate every condition from the last result and the cycle's facts.
pub fn evaluate(last: Option<&StepResult>, facts: &CycleFacts) -> ConditionSet {
    ConditionSet::new()
        .with(Condition::BuildNeeded, build_needed(last))
        .with(Condition::BuildWasLastAction, build_was_last_action(last))
        .with(Condition::BuildSucceeded, build_succeeded(last))
        .with(Condition::BuildFailed, build_failed(last))
        .with(Condition::ProjectLoaded, facts.project_loaded)
        .with(Condition::RequestPrepared, facts.request_prepared)
        .with(Condition::CodeModified, facts.code_modified)
        .with(Condition::BuildCommandDeclared, facts.build_command_declared)
        .with(Condition::CycleClosed, facts.cycle_closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        BuildResult, CompletionRecord, FailureKind, ModificationReport, ModificationRequest,
        SoftwareProject, Verdict,
    };
    use chrono::Utc;

    fn build(verdict: Verdict) -> StepResult {
        StepResult::Build(BuildResult {
            verdict,
            failure: (verdict == Verdict::Failure).then_some(FailureKind::BuildFailed),
            diagnostic: String::new(),
            elapsed_ms: 10,
        })
    }

    fn report() -> StepResult {
        StepResult::Report(ModificationReport {
            text: "changed".to_string(),
            files_changed: vec!["a.txt".to_string()],
        })
    }

    fn all_results() -> Vec<Option<StepResult>> {
        let request = ModificationRequest::new("r", "id", Utc::now());
        let mut created = SoftwareProject::new("/p");
        created.was_created = true;
        vec![
            None,
            Some(StepResult::Project(SoftwareProject::new("/p"))),
            Some(StepResult::Project(created)),
            Some(StepResult::Request(request.clone())),
            Some(report()),
            Some(build(Verdict::Success)),
            Some(build(Verdict::Failure)),
            Some(StepResult::Completion(CompletionRecord::new(
                request,
                ModificationReport {
                    text: "t".to_string(),
                    files_changed: Vec::new(),
                },
                "m",
                Utc::now(),
            ))),
        ]
    }

    #[test]
    fn succeeded_and_failed_are_never_both_true() {
        for last in all_results() {
            let set = evaluate(last.as_ref(), &CycleFacts::default());
            assert!(
                !(set.get(Condition::BuildSucceeded) && set.get(Condition::BuildFailed)),
                "both true for {last:?}"
            );
        }
    }

    #[test]
    fn build_outcomes_are_exhaustive_over_build_results() {
        for verdict in [Verdict::Success, Verdict::Failure] {
            let last = build(verdict);
            let set = evaluate(Some(&last), &CycleFacts::default());
            assert!(set.get(Condition::BuildSucceeded) ^ set.get(Condition::BuildFailed));
            assert!(set.get(Condition::BuildWasLastAction));
        }
    }

    #[test]
    fn build_needed_after_report_but_not_after_build() {
        assert!(build_needed(Some(&report())));
        assert!(!build_needed(Some(&build(Verdict::Success))));
        assert!(!build_needed(Some(&build(Verdict::Failure))));
        assert!(!build_needed(None));
    }

    #[test]
    fn build_needed_for_created_project_only() {
        let mut project = SoftwareProject::new("/p");
        assert!(!build_needed(Some(&StepResult::Project(project.clone()))));
        project.was_created = true;
        assert!(build_needed(Some(&StepResult::Project(project))));
    }

    #[test]
    fn facts_flow_into_condition_set() {
        let facts = CycleFacts {
            project_loaded: true,
            build_command_declared: true,
            ..CycleFacts::default()
        };
        let set = evaluate(None, &facts);
        assert_eq!(
            set.true_conditions(),
            vec![Condition::ProjectLoaded, Condition::BuildCommandDeclared]
        );
    }

    #[test]
    fn display_lists_every_condition() {
        let rendered = ConditionSet::new().with(Condition::BuildFailed, true).to_string();
        for condition in Condition::ALL {
            assert!(rendered.contains(condition.as_str()));
        }
        assert!(rendered.contains("build_failed=true"));
    }
}
