//! Change tracking for a project's working tree.
//!
//! A tracker holds a baseline. [`ChangeTracker::flush`] moves the baseline to
//! the current working-tree state; [`ChangeTracker::changes`] lists paths that
//! differ from it. Storage problems are reported as [`StorageError`], never as
//! an empty change set.
//!
//! Trackers opened through [`open_tracker`] keep the baseline of the last
//! completed cycle in `.coder/baseline.json`, so a new process resumes the
//! pending-change view where the previous cycle ended.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::io::audit::AUDIT_DIR;
use crate::io::config::write_atomic;
use crate::io::git::Git;

pub const BASELINE_FILE: &str = "baseline.json";

/// Failure to read or snapshot a project's working tree.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("project root {0} is not a readable directory")]
    MissingRoot(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("git snapshot failed in {root}: {message}")]
    Git { root: PathBuf, message: String },

    #[error("failed to save baseline {path}: {message}")]
    Baseline { path: PathBuf, message: String },
}

/// Pending-change view of a project's working tree.
pub trait ChangeTracker {
    /// Commit the current working-tree state as the new baseline.
    fn flush(&mut self) -> Result<(), StorageError>;

    /// Sorted, de-duplicated paths (relative, `/`-separated) changed since the last flush.
    fn changes(&self) -> Result<Vec<String>, StorageError>;

    /// Flush at the end of a completed cycle. Trackers with a saved baseline
    /// also write it, so the next process starts from here.
    fn complete(&mut self) -> Result<(), StorageError> {
        self.flush()
    }
}

/// Which tracker implementation to use for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    /// Content hashes of every file under the root.
    #[default]
    Snapshot,
    /// Git tree snapshots (respects `.gitignore`).
    Git,
}

/// Open a tracker of the given kind that resumes from the baseline saved by
/// the last completed cycle, or from the current state when there is none.
pub fn open_tracker(
    kind: TrackerKind,
    root: &Path,
    ignore: &[String],
) -> Result<Box<dyn ChangeTracker>, StorageError> {
    Ok(match kind {
        TrackerKind::Snapshot => Box::new(SnapshotTracker::resume(root, ignore.to_vec())?),
        TrackerKind::Git => Box::new(GitTracker::resume(root)?),
    })
}

impl<T: ChangeTracker + ?Sized> ChangeTracker for Box<T> {
    fn flush(&mut self) -> Result<(), StorageError> {
        (**self).flush()
    }

    fn changes(&self) -> Result<Vec<String>, StorageError> {
        (**self).changes()
    }

    fn complete(&mut self) -> Result<(), StorageError> {
        (**self).complete()
    }
}

pub fn baseline_path(root: &Path) -> PathBuf {
    root.join(AUDIT_DIR).join(BASELINE_FILE)
}

/// Baseline written when a cycle completes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum SavedBaseline {
    Snapshot { files: BTreeMap<String, String> },
    Git { tree: String },
}

/// Read the saved baseline. A file that no longer parses is ignored with a
/// warning; the tracker then starts from the current state.
fn load_baseline(path: &Path) -> Result<Option<SavedBaseline>, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    match serde_json::from_str(&raw) {
        Ok(saved) => Ok(Some(saved)),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "ignoring unreadable baseline");
            Ok(None)
        }
    }
}

fn save_baseline(path: &Path, saved: &SavedBaseline) -> Result<(), StorageError> {
    let failed = |message: String| StorageError::Baseline {
        path: path.to_path_buf(),
        message,
    };
    let json = serde_json::to_string_pretty(saved).map_err(|e| failed(e.to_string()))?;
    write_atomic(path, &json).map_err(|e| failed(format!("{e:#}")))?;
    debug!(path = %path.display(), "baseline saved");
    Ok(())
}

/// Directory names never tracked, regardless of configuration.
const ALWAYS_IGNORED: [&str; 2] = [".git", AUDIT_DIR];

/// Tracker that hashes file contents under the root.
#[derive(Debug)]
pub struct SnapshotTracker {
    root: PathBuf,
    ignore: Vec<String>,
    baseline: BTreeMap<String, String>,
    saved_at: Option<PathBuf>,
}

impl SnapshotTracker {
    /// Open a tracker with its baseline at the current state.
    ///
    /// `ignore` lists directory names (at any depth) to skip, e.g. `target`.
    pub fn open(root: impl Into<PathBuf>, ignore: Vec<String>) -> Result<Self, StorageError> {
        let mut tracker = Self {
            root: root.into(),
            ignore,
            baseline: BTreeMap::new(),
            saved_at: None,
        };
        tracker.flush()?;
        Ok(tracker)
    }

    /// Open a tracker whose baseline is the one saved at the last completed
    /// cycle, and which saves it again on [`ChangeTracker::complete`].
    pub fn resume(root: impl Into<PathBuf>, ignore: Vec<String>) -> Result<Self, StorageError> {
        let mut tracker = Self::open(root, ignore)?;
        let path = baseline_path(&tracker.root);
        match load_baseline(&path)? {
            Some(SavedBaseline::Snapshot { files }) => {
                debug!(files = files.len(), "resuming saved baseline");
                tracker.baseline = files;
            }
            Some(SavedBaseline::Git { .. }) => {
                warn!(path = %path.display(), "saved baseline is from the git tracker, starting fresh");
            }
            None => {}
        }
        tracker.saved_at = Some(path);
        Ok(tracker)
    }

    fn is_ignored(&self, name: &str) -> bool {
        ALWAYS_IGNORED.contains(&name) || self.ignore.iter().any(|i| i == name)
    }

    #[instrument(skip_all, fields(root = %self.root.display()))]
    fn snapshot(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.root.is_dir() {
            return Err(StorageError::MissingRoot(self.root.clone()));
        }
        let mut hashes = BTreeMap::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_type().is_dir()
                        && self.is_ignored(&entry.file_name().to_string_lossy()))
            });
        for entry in walker {
            let entry = entry.map_err(|source| StorageError::Walk {
                path: self.root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let bytes = fs::read(path).map_err(|source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            hashes.insert(relative_key(&self.root, path), hex::encode(Sha256::digest(&bytes)));
        }
        debug!(files = hashes.len(), "snapshot taken");
        Ok(hashes)
    }
}

impl ChangeTracker for SnapshotTracker {
    fn flush(&mut self) -> Result<(), StorageError> {
        self.baseline = self.snapshot()?;
        Ok(())
    }

    fn complete(&mut self) -> Result<(), StorageError> {
        self.flush()?;
        if let Some(path) = &self.saved_at {
            save_baseline(
                path,
                &SavedBaseline::Snapshot {
                    files: self.baseline.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn changes(&self) -> Result<Vec<String>, StorageError> {
        let current = self.snapshot()?;
        let mut changed: Vec<String> = current
            .iter()
            .filter(|(path, hash)| self.baseline.get(*path) != Some(*hash))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            self.baseline
                .keys()
                .filter(|path| !current.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        changed.dedup();
        Ok(changed)
    }
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Tracker backed by git tree snapshots in a private index.
#[derive(Debug)]
pub struct GitTracker {
    git: Git,
    index_file: PathBuf,
    baseline: String,
    saved_at: Option<PathBuf>,
}

impl GitTracker {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StorageError::MissingRoot(root));
        }
        let git = Git::new(&root);
        let is_repo = git.is_work_tree().map_err(|e| git_error(&root, &e))?;
        if !is_repo {
            return Err(StorageError::Git {
                root,
                message: "not a git work tree".to_string(),
            });
        }
        let index_file = git
            .git_dir()
            .map_err(|e| git_error(&root, &e))?
            .join("coder.index");
        let mut tracker = Self {
            git,
            index_file,
            baseline: String::new(),
            saved_at: None,
        };
        tracker.flush()?;
        Ok(tracker)
    }

    /// Like [`SnapshotTracker::resume`], for git tree snapshots. A saved tree
    /// that is no longer in the object store is dropped.
    pub fn resume(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let mut tracker = Self::open(root)?;
        let path = baseline_path(tracker.git.workdir());
        match load_baseline(&path)? {
            Some(SavedBaseline::Git { tree }) => {
                let known = tracker
                    .git
                    .has_tree(&tree)
                    .map_err(|e| git_error(tracker.git.workdir(), &e))?;
                if known {
                    debug!(tree = %tree, "resuming saved baseline");
                    tracker.baseline = tree;
                } else {
                    warn!(tree = %tree, "saved baseline tree is gone, starting fresh");
                }
            }
            Some(SavedBaseline::Snapshot { .. }) => {
                warn!(path = %path.display(), "saved baseline is from the snapshot tracker, starting fresh");
            }
            None => {}
        }
        tracker.saved_at = Some(path);
        Ok(tracker)
    }

    fn snapshot(&self) -> Result<String, StorageError> {
        self.git
            .snapshot_tree(&self.index_file, &[AUDIT_DIR])
            .map_err(|e| git_error(self.git.workdir(), &e))
    }
}

impl ChangeTracker for GitTracker {
    fn flush(&mut self) -> Result<(), StorageError> {
        self.baseline = self.snapshot()?;
        Ok(())
    }

    fn complete(&mut self) -> Result<(), StorageError> {
        self.flush()?;
        if let Some(path) = &self.saved_at {
            save_baseline(
                path,
                &SavedBaseline::Git {
                    tree: self.baseline.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn changes(&self) -> Result<Vec<String>, StorageError> {
        let current = self.snapshot()?;
        self.git
            .diff_trees(&self.baseline, &current)
            .map_err(|e| git_error(self.git.workdir(), &e))
    }
}

fn git_error(root: &Path, err: &anyhow::Error) -> StorageError {
    StorageError::Git {
        root: root.to_path_buf(),
        message: format!("{err:#}"),
    }
}
