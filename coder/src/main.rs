//! Condition-driven code modification CLI.
//!
//! Keeps a focus on one known project (`coder.toml`) and runs one
//! modify/build/fix cycle per request against it, appending each request and
//! completion to the project's `.coder/log.jsonl`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use coder::cycle::{CycleDeps, CycleStop, run_cycle};
use coder::exit_codes;
use coder::focus::FocusSession;
use coder::io::audit::{AuditEntry, AuditLog};
use coder::io::builder::ShellBuildRunner;
use coder::io::collaborator::CommandCollaborator;
use coder::io::config::DEFAULT_CONFIG_FILE;
use coder::io::tracker::open_tracker;
use coder::logging;
use coder::steps::CycleSettings;

#[derive(Parser)]
#[command(
    name = "coder",
    version,
    about = "Condition-driven code modification cycles"
)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the root of the focused project.
    Focus,
    /// Focus the first known project whose root contains NAME.
    SetFocus {
        /// Substring of the project root.
        name: String,
    },
    /// Run one modification cycle against the focused project.
    Run {
        /// What to change, in plain language.
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },
    /// Print the focused project's audit log.
    Log,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Focus => cmd_focus(&cli.config),
        Command::SetFocus { name } => cmd_set_focus(&cli.config, &name),
        Command::Run { request } => cmd_run(&cli.config, &request.join(" ")),
        Command::Log => cmd_log(&cli.config),
    }
}

fn cmd_focus(config: &Path) -> Result<i32> {
    let session = FocusSession::open(config)?;
    match session.current() {
        Some(project) => {
            println!("{}", project.root_display());
            Ok(exit_codes::OK)
        }
        None => {
            println!("no project focused");
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn cmd_set_focus(config: &Path, name: &str) -> Result<i32> {
    let session = FocusSession::open(config)?;
    match session.set_focus(name)? {
        Some(project) => {
            println!("{}", project.root_display());
            Ok(exit_codes::OK)
        }
        None => {
            println!("project not found: {name}");
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn cmd_run(config: &Path, request: &str) -> Result<i32> {
    let session = FocusSession::open(config)?;
    let Some(project) = session.current() else {
        eprintln!("no project focused; use `coder set-focus <name>` first");
        return Ok(exit_codes::NOT_FOUND);
    };
    let cfg = session.config();
    let mut tracker = open_tracker(cfg.tracker, &project.root, &cfg.tracker_ignore)
        .with_context(|| format!("open change tracker for {}", project.root_display()))?;
    let collaborator =
        CommandCollaborator::new(cfg.collaborator.command.clone(), cfg.output_limit_bytes)?;
    let builder = ShellBuildRunner::new(cfg.output_limit_bytes);
    let audit = AuditLog::for_project(&project.root);
    let settings = CycleSettings::from_config(cfg);

    let outcome = run_cycle(
        &project,
        request,
        &settings,
        CycleDeps {
            collaborator: &collaborator,
            builder: &builder,
            audit: &audit,
            tracker: &mut *tracker,
        },
        |record| eprintln!("step: {} -> {}", record.step, record.result.kind_name()),
    )?;

    for err in &outcome.audit_errors {
        eprintln!("warning: {err}");
    }
    match outcome.stop {
        CycleStop::Done(completion) => {
            println!("{}", completion.content());
            if !completion.report.files_changed.is_empty() {
                println!("\nFiles changed:");
                for path in &completion.report.files_changed {
                    println!("  {path}");
                }
            }
            println!("\nSuggested commit message: {}", completion.suggested_commit_message);
            Ok(exit_codes::OK)
        }
        CycleStop::Aborted(report) => {
            eprintln!("{report}");
            Ok(exit_codes::ABORTED)
        }
    }
}

fn cmd_log(config: &Path) -> Result<i32> {
    let session = FocusSession::open(config)?;
    let Some(project) = session.current() else {
        eprintln!("no project focused; use `coder set-focus <name>` first");
        return Ok(exit_codes::NOT_FOUND);
    };
    let log = AuditLog::for_project(&project.root);
    for entry in log.read_all()? {
        match entry {
            AuditEntry::Request(request) => println!(
                "{} {} request: {}",
                request.timestamp.to_rfc3339(),
                request.id,
                request.request
            ),
            AuditEntry::Completion(completion) => println!(
                "{} {} completed in {}s: {}",
                completion.timestamp.to_rfc3339(),
                completion.request.id,
                completion.running_time().num_seconds(),
                completion.suggested_commit_message
            ),
        }
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_set_focus() {
        let cli = Cli::parse_from(["coder", "set-focus", "petclinic"]);
        assert!(matches!(cli.command, Command::SetFocus { ref name } if name == "petclinic"));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_run_joins_words() {
        let cli = Cli::parse_from([
            "coder", "--config", "/tmp/c.toml", "run", "add", "a", "health", "endpoint",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/c.toml"));
        match cli.command {
            Command::Run { request } => assert_eq!(request.join(" "), "add a health endpoint"),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_request() {
        assert!(Cli::try_parse_from(["coder", "run"]).is_err());
    }
}
