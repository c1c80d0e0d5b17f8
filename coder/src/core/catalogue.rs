//! Static catalogue of cycle steps and their planning metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::conditions::{Condition, ConditionSet};

/// Every step the cycle knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    LoadProject,
    ConvertRequest,
    ModifyProject,
    Build,
    BuildWithCollaborator,
    FixBrokenBuild,
    ShareReport,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::LoadProject => "load_project",
            StepKind::ConvertRequest => "convert_request",
            StepKind::ModifyProject => "modify_project",
            StepKind::Build => "build",
            StepKind::BuildWithCollaborator => "build_with_collaborator",
            StepKind::FixBrokenBuild => "fix_broken_build",
            StepKind::ShareReport => "share_report",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition that must hold with a given value before a step may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub condition: Condition,
    pub expected: bool,
}

impl Requirement {
    pub fn is(condition: Condition) -> Self {
        Self {
            condition,
            expected: true,
        }
    }

    pub fn not(condition: Condition) -> Self {
        Self {
            condition,
            expected: false,
        }
    }

    pub fn holds(&self, conditions: &ConditionSet) -> bool {
        conditions.get(self.condition) == self.expected
    }
}

/// Catalogue entry for one candidate step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub cost: u32,
    pub preconditions: Vec<Requirement>,
    pub postconditions: Vec<Condition>,
    pub can_rerun: bool,
}

impl StepDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn preconditions_hold(&self, conditions: &ConditionSet) -> bool {
        self.preconditions.iter().all(|req| req.holds(conditions))
    }

    /// True when every postcondition is already satisfied.
    ///
    /// A step without postconditions is never considered satisfied.
    pub fn postconditions_satisfied(&self, conditions: &ConditionSet) -> bool {
        !self.postconditions.is_empty() && self.postconditions.iter().all(|c| conditions.get(*c))
    }
}

/// Cost policy for the two build strategies.
///
/// Only the ordering is a contract: the deterministic build must be cheaper
/// than asking the collaborator to work out how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepCosts {
    pub build: u32,
    pub build_with_collaborator: u32,
}

impl Default for StepCosts {
    fn default() -> Self {
        Self {
            build: 500,
            build_with_collaborator: 10_000,
        }
    }
}

/// The catalogue in declaration order (ties on cost resolve to the earlier entry).
pub fn default_catalogue(costs: &StepCosts) -> Vec<StepDescriptor> {
    use Condition::{
        BuildCommandDeclared, BuildFailed, BuildNeeded, BuildSucceeded, BuildWasLastAction,
        CodeModified, CycleClosed, ProjectLoaded, RequestPrepared,
    };

    vec![
        StepDescriptor {
            kind: StepKind::LoadProject,
            cost: 0,
            preconditions: Vec::new(),
            postconditions: vec![ProjectLoaded],
            can_rerun: false,
        },
        StepDescriptor {
            kind: StepKind::ConvertRequest,
            cost: 0,
            preconditions: vec![Requirement::is(ProjectLoaded)],
            postconditions: vec![RequestPrepared],
            can_rerun: false,
        },
        StepDescriptor {
            kind: StepKind::ModifyProject,
            cost: 0,
            preconditions: vec![
                Requirement::is(RequestPrepared),
                Requirement::not(CodeModified),
            ],
            postconditions: vec![BuildNeeded],
            can_rerun: true,
        },
        StepDescriptor {
            kind: StepKind::Build,
            cost: costs.build,
            preconditions: vec![
                Requirement::is(BuildNeeded),
                Requirement::is(BuildCommandDeclared),
            ],
            postconditions: vec![BuildSucceeded],
            can_rerun: true,
        },
        StepDescriptor {
            kind: StepKind::BuildWithCollaborator,
            cost: costs.build_with_collaborator,
            preconditions: vec![Requirement::is(BuildNeeded)],
            postconditions: vec![BuildSucceeded],
            can_rerun: true,
        },
        // The fix step produces a report, so the best it can achieve is a new
        // build being needed; it can never claim the build succeeded.
        StepDescriptor {
            kind: StepKind::FixBrokenBuild,
            cost: 0,
            preconditions: vec![
                Requirement::is(BuildFailed),
                Requirement::is(BuildWasLastAction),
            ],
            postconditions: vec![BuildNeeded],
            can_rerun: true,
        },
        StepDescriptor {
            kind: StepKind::ShareReport,
            cost: 0,
            preconditions: vec![Requirement::is(BuildSucceeded), Requirement::is(CodeModified)],
            postconditions: vec![CycleClosed],
            can_rerun: false,
        },
    ]
}
