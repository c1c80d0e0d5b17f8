//! Test-only doubles for the collaborator, build runner and project fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::classifier::{BuildExit, RawBuild};
use crate::core::types::SoftwareProject;
use crate::io::builder::BuildRunner;
use crate::io::collaborator::{Collaborator, CollaboratorTimeout, PromptRequest, Purpose};

/// One scripted collaborator reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Write files (relative to the request workdir), then answer.
    Answer {
        text: String,
        writes: Vec<(String, String)>,
    },
    /// Fail the call.
    Fail(String),
    /// Fail the call as a timeout with this partial output.
    TimeOut(String),
}

/// Collaborator that replays scripted replies in order and records every call.
#[derive(Debug, Default)]
pub struct ScriptedCollaborator {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<PromptRequest>>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, text: &str) -> Self {
        self.push(ScriptedReply::Answer {
            text: text.to_string(),
            writes: Vec::new(),
        })
    }

    pub fn answer_writing(self, text: &str, writes: &[(&str, &str)]) -> Self {
        self.push(ScriptedReply::Answer {
            text: text.to_string(),
            writes: writes
                .iter()
                .map(|(path, contents)| ((*path).to_string(), (*contents).to_string()))
                .collect(),
        })
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(ScriptedReply::Fail(message.to_string()))
    }

    pub fn time_out(self, partial_output: &str) -> Self {
        self.push(ScriptedReply::TimeOut(partial_output.to_string()))
    }

    fn push(self, reply: ScriptedReply) -> Self {
        self.replies.borrow_mut().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests.borrow().clone()
    }

    pub fn purposes(&self) -> Vec<Purpose> {
        self.requests.borrow().iter().map(|r| r.purpose).collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Collaborator for ScriptedCollaborator {
    fn generate(&self, request: &PromptRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left for {}", request.purpose.as_str()))?;
        match reply {
            ScriptedReply::Answer { text, writes } => {
                for (path, contents) in writes {
                    let target = request.workdir.join(path);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(target, contents)?;
                }
                Ok(text)
            }
            ScriptedReply::Fail(message) => Err(anyhow!(message)),
            ScriptedReply::TimeOut(partial_output) => Err(CollaboratorTimeout {
                purpose: request.purpose,
                timeout: request.timeout,
                partial_output,
            }
            .into()),
        }
    }
}

/// Build runner that replays scripted outcomes and records commands.
#[derive(Debug, Default)]
pub struct ScriptedBuildRunner {
    builds: RefCell<VecDeque<RawBuild>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedBuildRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exits(self, code: i32, transcript: &str) -> Self {
        self.push(RawBuild {
            transcript: transcript.to_string(),
            exit: BuildExit::Exited(code),
        })
    }

    pub fn times_out(self, transcript: &str) -> Self {
        self.push(RawBuild {
            transcript: transcript.to_string(),
            exit: BuildExit::TimedOut,
        })
    }

    fn push(self, build: RawBuild) -> Self {
        self.builds.borrow_mut().push_back(build);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl BuildRunner for ScriptedBuildRunner {
    fn run(&self, _root: &Path, command: &str, _timeout: Duration) -> RawBuild {
        self.commands.borrow_mut().push(command.to_string());
        self.builds.borrow_mut().pop_front().unwrap_or(RawBuild {
            transcript: String::new(),
            exit: BuildExit::NotStarted("no scripted build left".to_string()),
        })
    }
}

/// A project rooted in a temporary directory.
pub struct TestProject {
    _temp: TempDir,
    project: SoftwareProject,
}

impl TestProject {
    /// Project with a README and a declared build command.
    pub fn new() -> Self {
        Self::with_build_command(Some("make test"))
    }

    pub fn with_build_command(build_command: Option<&str>) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("README.md"), "# demo\n").expect("write readme");
        let mut project = SoftwareProject::new(temp.path()).with_tech("Make");
        project.build_command = build_command.map(str::to_string);
        Self {
            _temp: temp,
            project,
        }
    }

    pub fn root(&self) -> &Path {
        &self.project.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.project.root.join(relative)
    }

    pub fn project(&self) -> &SoftwareProject {
        &self.project
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
