//! Running a project's declared build command.

use std::path::Path;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::classifier::{BuildExit, RawBuild};
use crate::io::process::{run_command_with_timeout, shell_command};

/// Runs a build command and reports what happened, unclassified.
pub trait BuildRunner {
    /// Run `command` in `root`.
    ///
    /// Never fails: a build that could not be started is reported as
    /// [`BuildExit::NotStarted`] so it is classified like any other failure.
    fn run(&self, root: &Path, command: &str, timeout: Duration) -> RawBuild;
}

/// Runs the build command through the platform shell.
#[derive(Debug, Clone)]
pub struct ShellBuildRunner {
    output_limit_bytes: usize,
}

impl ShellBuildRunner {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl BuildRunner for ShellBuildRunner {
    #[instrument(skip_all, fields(root = %root.display(), command = %command, timeout_secs = timeout.as_secs()))]
    fn run(&self, root: &Path, command: &str, timeout: Duration) -> RawBuild {
        info!("running build");
        let mut cmd = shell_command(command);
        cmd.current_dir(root);
        match run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes) {
            Ok(output) => {
                let exit = if output.timed_out {
                    BuildExit::TimedOut
                } else {
                    match output.status.code() {
                        Some(code) => BuildExit::Exited(code),
                        None => BuildExit::Signalled,
                    }
                };
                RawBuild {
                    transcript: output.combined_transcript(),
                    exit,
                }
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "build could not be started");
                RawBuild {
                    transcript: String::new(),
                    exit: BuildExit::NotStarted(format!("{err:#}")),
                }
            }
        }
    }
}
