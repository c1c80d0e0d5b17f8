//! Deterministic classification of build transcripts.
//!
//! The classifier is the single source of truth for build success. Whatever
//! the transcript looks like, it commits to [`Verdict::Success`] or
//! [`Verdict::Failure`]; anything it cannot vouch for is a failure.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::core::types::{BuildResult, FailureKind, Verdict};

/// How the build process ended, as observed by whoever ran it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildExit {
    /// The process exited with a code.
    Exited(i32),
    /// The process ended without an exit code (killed by a signal).
    Signalled,
    /// The process exceeded its timeout and was killed.
    TimedOut,
    /// The build could not be started at all.
    NotStarted(String),
    /// No exit status is available; only the transcript can be judged.
    Unreported,
}

/// Raw, unclassified output of a build attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuild {
    pub transcript: String,
    pub exit: BuildExit,
}

/// What the transcript alone says about the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TranscriptSignal {
    Success,
    Failure,
    Unknown,
}

/// Explicit status line a collaborator is asked to end its transcript with.
static STATUS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*BUILD STATUS:\s*(SUCCESS|FAILURE)\s*$").expect("status line regex")
});

static FAILURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)(BUILD FAILURE|BUILD FAILED|COMPILATION ERROR|error\[E\d+\]|^error(:|\[)",
        r"|test result: FAILED|Tests run:.*Failures: [1-9]|npm ERR!|^FAILED\b)"
    ))
    .expect("failure regex")
});

static SUCCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(BUILD SUCCESS|BUILD SUCCESSFUL|test result: ok\.|^\s*Finished\b)")
        .expect("success regex")
});

/// Exit codes shells use for "command not found" and "not executable".
const SHELL_CANNOT_RUN: [i32; 2] = [126, 127];

fn transcript_signal(transcript: &str) -> TranscriptSignal {
    if let Some(caps) = STATUS_LINE_RE.captures_iter(transcript).last() {
        return if caps[1].eq_ignore_ascii_case("success") {
            TranscriptSignal::Success
        } else {
            TranscriptSignal::Failure
        };
    }
    if FAILURE_RE.is_match(transcript) {
        return TranscriptSignal::Failure;
    }
    if SUCCESS_RE.is_match(transcript) {
        return TranscriptSignal::Success;
    }
    TranscriptSignal::Unknown
}

/// Classify a raw build into a [`BuildResult`].
///
/// - An exit code is authoritative when present: `0` succeeds, anything else fails.
/// - `126`/`127`, or a non-zero exit with an empty transcript, mean the build
///   could not run rather than that the code is broken.
/// - Timeouts and signals always fail, whatever partial output says.
/// - Without an exit status the transcript decides; an explicit
///   `BUILD STATUS:` line wins, failure markers beat success markers, and a
///   transcript with neither is a failure.
///
/// The diagnostic keeps at most `diagnostic_limit` bytes from the end of the
/// transcript, where build tools report what went wrong.
pub fn classify_build(raw: &RawBuild, elapsed: Duration, diagnostic_limit: usize) -> BuildResult {
    let transcript = raw.transcript.trim_end();
    let (verdict, failure, headline) = match &raw.exit {
        BuildExit::NotStarted(reason) => (
            Verdict::Failure,
            Some(FailureKind::CouldNotRun),
            format!("could not run build: {reason}"),
        ),
        BuildExit::TimedOut => (
            Verdict::Failure,
            Some(FailureKind::TimedOut),
            format!("build timed out after {}s", elapsed.as_secs()),
        ),
        BuildExit::Signalled => (
            Verdict::Failure,
            Some(FailureKind::BuildFailed),
            "build terminated by signal".to_string(),
        ),
        BuildExit::Exited(0) => (Verdict::Success, None, String::new()),
        BuildExit::Exited(code) if SHELL_CANNOT_RUN.contains(code) || transcript.is_empty() => (
            Verdict::Failure,
            Some(FailureKind::CouldNotRun),
            format!("could not run build: exit code {code}"),
        ),
        BuildExit::Exited(code) => (
            Verdict::Failure,
            Some(FailureKind::BuildFailed),
            format!("build failed with exit code {code}"),
        ),
        BuildExit::Unreported => match transcript_signal(transcript) {
            TranscriptSignal::Success => (Verdict::Success, None, String::new()),
            TranscriptSignal::Failure => (
                Verdict::Failure,
                Some(FailureKind::BuildFailed),
                "build reported failure".to_string(),
            ),
            TranscriptSignal::Unknown => (
                Verdict::Failure,
                Some(FailureKind::BuildFailed),
                "build outcome could not be determined from its output".to_string(),
            ),
        },
    };

    BuildResult {
        verdict,
        failure,
        diagnostic: render_diagnostic(&headline, transcript, diagnostic_limit),
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
}

fn render_diagnostic(headline: &str, transcript: &str, limit: usize) -> String {
    let tail = bounded_tail(transcript, limit);
    match (headline.is_empty(), tail.is_empty()) {
        (true, _) => tail,
        (false, true) => headline.to_string(),
        (false, false) => format!("{headline}\n{tail}"),
    }
}

/// Keep the last `limit` bytes of `text`, cut on a char boundary.
fn bounded_tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated {start} bytes]\n{}", &text[start..])
}
