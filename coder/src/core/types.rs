//! Shared deterministic types for the modification cycle.
//!
//! These types define stable contracts between core components and the audit
//! log. They do not depend on external state; timestamps and ids are supplied
//! by the caller.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked codebase under a working root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareProject {
    pub root: PathBuf,
    /// Shell command that builds and tests the project (e.g. `mvn test`).
    #[serde(default)]
    pub build_command: Option<String>,
    /// Free-text description of the technology stack.
    #[serde(default)]
    pub tech: String,
    /// Free-text coding style notes.
    #[serde(default)]
    pub coding_style: Option<String>,
    /// Set when the project was just registered and has never been built.
    /// [`crate::focus::FocusService::save_and_switch`] sets it for new roots.
    #[serde(default)]
    pub was_created: bool,
}

impl SoftwareProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            build_command: None,
            tech: String::new(),
            coding_style: None,
            was_created: false,
        }
    }

    pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = Some(command.into());
        self
    }

    pub fn with_tech(mut self, tech: impl Into<String>) -> Self {
        self.tech = tech.into();
        self
    }

    /// The declared build command, if it is non-blank.
    pub fn declared_build_command(&self) -> Option<&str> {
        self.build_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }

    pub fn root_display(&self) -> String {
        self.root.display().to_string()
    }
}

/// A single instruction to change code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRequest {
    pub request: String,
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl ModificationRequest {
    pub fn new(request: impl Into<String>, id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            request: request.into(),
            id: id.into(),
            timestamp,
        }
    }
}

/// What a modification or fix step did to the code.
///
/// Not necessarily the final report: a build may still fail and trigger a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationReport {
    pub text: String,
    pub files_changed: Vec<String>,
}

/// Binary classification of a build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Failure,
}

/// Why a failed build failed.
///
/// `BuildFailed` means the build ran and reported failure (a code problem);
/// the other variants mean it could not produce a trustworthy verdict (a
/// configuration or environment problem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BuildFailed,
    TimedOut,
    CouldNotRun,
}

/// Classified outcome of one build attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub verdict: Verdict,
    /// Present exactly when `verdict` is `Failure`.
    pub failure: Option<FailureKind>,
    /// Bounded tail of the build transcript, prefixed with a failure headline.
    pub diagnostic: String,
    pub elapsed_ms: u64,
}

impl BuildResult {
    pub fn succeeded(&self) -> bool {
        self.verdict == Verdict::Success
    }

    pub fn failed(&self) -> bool {
        self.verdict == Verdict::Failure
    }
}

/// Final outcome of one request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub request: ModificationRequest,
    pub report: ModificationReport,
    pub suggested_commit_message: String,
    pub timestamp: DateTime<Utc>,
}

impl CompletionRecord {
    /// Close a cycle at `completed_at`.
    ///
    /// A completion never precedes its request: a clock that went backwards is
    /// clamped to the request timestamp so running time stays non-negative.
    pub fn new(
        request: ModificationRequest,
        report: ModificationReport,
        suggested_commit_message: impl Into<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let timestamp = completed_at.max(request.timestamp);
        Self {
            request,
            report,
            suggested_commit_message: suggested_commit_message.into(),
            timestamp,
        }
    }

    pub fn running_time(&self) -> chrono::Duration {
        self.timestamp - self.request.timestamp
    }

    pub fn content(&self) -> String {
        format!(
            "Code modification completed in {} seconds\n{}",
            self.running_time().num_seconds(),
            self.report.text
        )
    }
}

/// Result of the most recently completed step.
///
/// Conditions pattern-match on the variant; nothing inspects runtime types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Project(SoftwareProject),
    Request(ModificationRequest),
    Report(ModificationReport),
    Build(BuildResult),
    Completion(CompletionRecord),
}

impl StepResult {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepResult::Project(_) => "project",
            StepResult::Request(_) => "request",
            StepResult::Report(_) => "report",
            StepResult::Build(_) => "build",
            StepResult::Completion(_) => "completion",
        }
    }
}
