//! Persisted focus selection (`coder.focus.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::io::config::write_atomic;

/// On-disk focus state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    /// Root of the focused project.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Load focus state. A missing file means no saved focus.
pub fn load_focus(path: &Path) -> Result<FocusState> {
    if !path.exists() {
        return Ok(FocusState::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Replace the focus state file atomically.
pub fn save_focus(path: &Path, state: &FocusState) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(state).context("serialize focus state")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
