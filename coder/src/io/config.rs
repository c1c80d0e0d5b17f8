//! Coder configuration stored in `coder.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::catalogue::StepCosts;
use crate::core::types::SoftwareProject;
use crate::io::tracker::TrackerKind;

pub const DEFAULT_CONFIG_FILE: &str = "coder.toml";

/// Coder configuration (TOML).
///
/// Missing fields fall back to defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoderConfig {
    /// Substring of the project root to focus when no focus has been saved.
    pub default_project: Option<String>,

    /// Wall-clock limit for any single step (collaborator call or build).
    pub step_timeout_secs: u64,

    /// Steps allowed in one cycle before it is aborted.
    pub max_steps: u32,

    /// Truncate captured child stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Bytes of build transcript kept in a build diagnostic.
    pub diagnostic_limit_bytes: usize,

    pub tracker: TrackerKind,

    /// Directory names the snapshot tracker skips (at any depth).
    pub tracker_ignore: Vec<String>,

    /// Ask the collaborator to restate user input as a modification request.
    pub convert_requests: bool,

    pub collaborator: CollaboratorConfig,

    pub costs: StepCosts,

    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Command that reads a prompt on stdin and answers on stdout.
    pub command: Vec<String>,
    pub primary_model: String,
    /// Model used to repair broken builds.
    pub fix_model: String,
    /// Standing directions appended to modification and fix prompts.
    pub directions: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            primary_model: "claude-sonnet".to_string(),
            fix_model: "claude-opus".to_string(),
            directions: [
                "Use the file tools to read code and directories.",
                "Use the web tools if you are asked to use a technology you don't know about.",
                "Always look for files in the project locally, not on the web.",
                "Make multiple small, focused edits.",
            ]
            .join("\n"),
        }
    }
}

/// A known project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub tech: String,
    #[serde(default)]
    pub coding_style: Option<String>,
}

impl ProjectConfig {
    pub fn to_project(&self) -> SoftwareProject {
        SoftwareProject {
            root: self.root.clone(),
            build_command: self.build_command.clone(),
            tech: self.tech.clone(),
            coding_style: self.coding_style.clone(),
            was_created: false,
        }
    }
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            default_project: None,
            step_timeout_secs: 30 * 60,
            max_steps: 20,
            output_limit_bytes: 1_000_000,
            diagnostic_limit_bytes: 20_000,
            tracker: TrackerKind::Snapshot,
            tracker_ignore: ["target", "node_modules", "build", ".idea"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            convert_requests: true,
            collaborator: CollaboratorConfig::default(),
            costs: StepCosts::default(),
            projects: Vec::new(),
        }
    }
}

impl CoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_timeout_secs == 0 {
            return Err(anyhow!("step_timeout_secs must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.diagnostic_limit_bytes == 0 {
            return Err(anyhow!("diagnostic_limit_bytes must be > 0"));
        }
        if self.collaborator.command.is_empty() || self.collaborator.command[0].trim().is_empty() {
            return Err(anyhow!("collaborator.command must be a non-empty array"));
        }
        if self.costs.build >= self.costs.build_with_collaborator {
            return Err(anyhow!(
                "costs.build ({}) must be lower than costs.build_with_collaborator ({})",
                self.costs.build,
                self.costs.build_with_collaborator
            ));
        }
        for project in &self.projects {
            if project.root.as_os_str().is_empty() {
                return Err(anyhow!("projects[].root must not be empty"));
            }
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn known_projects(&self) -> Vec<SoftwareProject> {
        self.projects.iter().map(ProjectConfig::to_project).collect()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CoderConfig::default()`.
pub fn load_config(path: &Path) -> Result<CoderConfig> {
    if !path.exists() {
        let cfg = CoderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CoderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CoderConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Path of the focus state file kept next to a config file.
pub fn focus_state_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("focus.json")
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
