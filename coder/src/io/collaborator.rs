//! Collaborator (LLM) invocation.
//!
//! The cycle only ever talks to a [`Collaborator`]; the production
//! implementation pipes the prompt to a configured command and reads the
//! answer from stdout. Capabilities are advisory: the command receives them in
//! its environment and decides what tools to expose.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Tool access granted to the collaborator for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    FileRead,
    FileWrite,
    WebFetch,
    Shell,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::FileRead => "file_read",
            Capability::FileWrite => "file_write",
            Capability::WebFetch => "web_fetch",
            Capability::Shell => "shell",
        }
    }
}

/// Why a prompt is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    ConvertRequest,
    Modify,
    Fix,
    Build,
    CommitMessage,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::ConvertRequest => "convert_request",
            Purpose::Modify => "modify",
            Purpose::Fix => "fix",
            Purpose::Build => "build",
            Purpose::CommitMessage => "commit_message",
        }
    }
}

/// One collaborator call.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub purpose: Purpose,
    pub model: String,
    pub prompt: String,
    /// Project root the collaborator works in.
    pub workdir: PathBuf,
    pub capabilities: Vec<Capability>,
    pub timeout: Duration,
}

/// Abstraction over collaborator backends.
pub trait Collaborator {
    /// Send a prompt and return the collaborator's final answer.
    ///
    /// A call that exceeds `request.timeout` must fail with [`CollaboratorTimeout`].
    fn generate(&self, request: &PromptRequest) -> Result<String>;
}

/// A collaborator call was terminated at its timeout.
///
/// Carries whatever output was produced before the kill; it is never a usable
/// answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorTimeout {
    pub purpose: Purpose,
    pub timeout: Duration,
    pub partial_output: String,
}

impl fmt::Display for CollaboratorTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collaborator {} call timed out after {}s",
            self.purpose.as_str(),
            self.timeout.as_secs()
        )
    }
}

impl std::error::Error for CollaboratorTimeout {}

/// Collaborator backed by an external command (prompt on stdin, answer on stdout).
///
/// The command sees `CODER_MODEL`, `CODER_PURPOSE` and `CODER_CAPABILITIES`
/// (comma-separated) in its environment and runs in the project root.
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    command: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandCollaborator {
    pub fn new(command: Vec<String>, output_limit_bytes: usize) -> Result<Self> {
        if command.is_empty() {
            return Err(anyhow!("collaborator command is empty"));
        }
        Ok(Self {
            command,
            output_limit_bytes,
        })
    }
}

impl Collaborator for CommandCollaborator {
    #[instrument(skip_all, fields(purpose = request.purpose.as_str(), model = %request.model, timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &PromptRequest) -> Result<String> {
        let capabilities: Vec<&str> = request.capabilities.iter().map(|c| c.as_str()).collect();
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .current_dir(&request.workdir)
            .env("CODER_MODEL", &request.model)
            .env("CODER_PURPOSE", request.purpose.as_str())
            .env("CODER_CAPABILITIES", capabilities.join(","));

        info!(workdir = %request.workdir.display(), "calling collaborator");
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run collaborator {}", self.command[0]))?;

        if output.timed_out {
            warn!("collaborator timed out");
            return Err(CollaboratorTimeout {
                purpose: request.purpose,
                timeout: request.timeout,
                partial_output: output.combined_transcript(),
            }
            .into());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(exit_code = ?output.status.code(), "collaborator failed");
            return Err(anyhow!(
                "collaborator exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let answer = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(bytes = answer.len(), "collaborator answered");
        Ok(answer)
    }
}
