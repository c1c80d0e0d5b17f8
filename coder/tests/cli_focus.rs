//! CLI tests for `coder focus`, `coder set-focus`, `coder run` and `coder log`.
//!
//! Spawns the coder binary against a temporary config and verifies output and
//! exit codes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use coder::exit_codes;
use coder::io::config::{CoderConfig, ProjectConfig, write_config};

struct Workspace {
    _temp: tempfile::TempDir,
    config_path: PathBuf,
    petclinic: PathBuf,
}

fn project_config(root: &Path, build_command: &str) -> ProjectConfig {
    ProjectConfig {
        root: root.to_path_buf(),
        build_command: Some(build_command.to_string()),
        tech: "Shell".to_string(),
        coding_style: None,
    }
}

fn workspace(collaborator_script: &str) -> Workspace {
    let temp = tempfile::tempdir().expect("tempdir");
    let petclinic = temp.path().join("spring-petclinic");
    let inventory = temp.path().join("inventory-api");
    fs::create_dir_all(&petclinic).expect("mkdir petclinic");
    fs::create_dir_all(&inventory).expect("mkdir inventory");

    let mut cfg = CoderConfig {
        convert_requests: false,
        projects: vec![
            project_config(&petclinic, "test -f src/health.txt"),
            project_config(&inventory, "true"),
        ],
        ..CoderConfig::default()
    };
    cfg.collaborator.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        collaborator_script.to_string(),
    ];
    let config_path = temp.path().join("coder.toml");
    write_config(&config_path, &cfg).expect("write config");
    Workspace {
        _temp: temp,
        config_path,
        petclinic,
    }
}

fn coder(ws: &Workspace, args: &[&str]) -> Output {
    coder_with_env(ws, args, &[])
}

fn coder_with_env(ws: &Workspace, args: &[&str], envs: &[(&str, &Path)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_coder"));
    cmd.arg("--config").arg(&ws.config_path).args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().expect("run coder")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn focus_without_selection_exits_not_found() {
    let ws = workspace("true");
    let output = coder(&ws, &["focus"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
    assert_eq!(stdout(&output), "no project focused");
}

#[test]
fn set_focus_by_substring_is_persisted() {
    let ws = workspace("true");

    let output = coder(&ws, &["set-focus", "petclinic"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), ws.petclinic.display().to_string());

    let output = coder(&ws, &["focus"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), ws.petclinic.display().to_string());
}

#[test]
fn set_focus_unknown_target_reports_not_found() {
    let ws = workspace("true");
    coder(&ws, &["set-focus", "petclinic"]);

    let output = coder(&ws, &["set-focus", "no-such-project"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
    assert_eq!(stdout(&output), "project not found: no-such-project");

    // The previous focus stands.
    let output = coder(&ws, &["focus"]);
    assert_eq!(stdout(&output), ws.petclinic.display().to_string());
}

#[test]
fn run_without_focus_exits_not_found() {
    let ws = workspace("true");
    let output = coder(&ws, &["run", "add", "a", "health", "endpoint"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("coder.toml");
    fs::write(&config_path, "max_steps = 0\n").expect("write");
    let output = Command::new(env!("CARGO_BIN_EXE_coder"))
        .arg("--config")
        .arg(&config_path)
        .arg("focus")
        .output()
        .expect("run coder");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_steps"));
}

#[cfg(unix)]
#[test]
fn run_completes_cycle_and_log_shows_it() {
    let ws = workspace(
        r#"cat > /dev/null
case "$CODER_PURPOSE" in
  modify) mkdir -p src && echo ok > src/health.txt && echo "Added health endpoint." ;;
  commit_message) echo "Add health endpoint" ;;
  *) echo "unexpected purpose $CODER_PURPOSE" >&2; exit 1 ;;
esac"#,
    );
    coder(&ws, &["set-focus", "petclinic"]);

    let output = coder(&ws, &["run", "add", "a", "health", "endpoint"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let printed = stdout(&output);
    assert!(printed.starts_with("Code modification completed in"));
    assert!(printed.contains("src/health.txt"));
    assert!(printed.contains("Suggested commit message: Add health endpoint"));
    assert!(ws.petclinic.join("src/health.txt").exists());

    let output = coder(&ws, &["log"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let log = stdout(&output);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("request: add a health endpoint"));
    assert!(lines[1].contains("Add health endpoint"));
}

#[cfg(unix)]
#[test]
fn run_aborts_when_collaborator_fails() {
    let ws = workspace("cat > /dev/null; echo 'model unavailable' >&2; exit 1");
    coder(&ws, &["set-focus", "petclinic"]);

    let output = coder(&ws, &["run", "add", "a", "health", "endpoint"]);
    assert_eq!(output.status.code(), Some(exit_codes::ABORTED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cycle aborted"));
    assert!(stderr.contains("modify_project"));
}

#[cfg(unix)]
#[test]
fn next_run_is_offered_changes_made_since_previous_completion() {
    let ws = workspace(
        r#"prompt=$(cat)
case "$CODER_PURPOSE" in
  modify) printf '%s\n=====\n' "$prompt" >> "$PROMPT_LOG"
          mkdir -p src && echo ok > src/health.txt && echo "Touched health endpoint." ;;
  commit_message) echo "Touch health endpoint" ;;
  *) exit 1 ;;
esac"#,
    );
    let prompt_log = ws.config_path.with_file_name("prompts.log");
    let envs = [("PROMPT_LOG", prompt_log.as_path())];
    coder(&ws, &["set-focus", "petclinic"]);

    let first = coder_with_env(&ws, &["run", "first", "request"], &envs);
    assert_eq!(
        first.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    fs::write(ws.petclinic.join("hand_edit.txt"), "edited by hand").expect("hand edit");
    let second = coder_with_env(&ws, &["run", "second", "request"], &envs);
    assert_eq!(
        second.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&second.stderr)
    );

    let log = fs::read_to_string(&prompt_log).expect("prompt log");
    let prompts: Vec<&str> = log.split("=====").filter(|p| !p.trim().is_empty()).collect();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("hand_edit.txt"));
    assert!(prompts[1].contains("Files changed since the last completed request"));
    assert!(prompts[1].contains("- hand_edit.txt"));
    // Work done by the first cycle is behind the saved baseline.
    assert!(!prompts[1].contains("src/health.txt"));
}
