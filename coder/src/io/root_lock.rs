//! At most one active cycle per project root within this process.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use tracing::debug;

static ACTIVE_ROOTS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Another cycle already holds the lock for this root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBusyError {
    pub root: PathBuf,
}

impl fmt::Display for RootBusyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "a modification cycle is already running in {}",
            self.root.display()
        )
    }
}

impl std::error::Error for RootBusyError {}

/// Exclusive claim on a project root, released on drop.
#[derive(Debug)]
pub struct RootLock {
    root: PathBuf,
}

impl RootLock {
    /// Claim `root` without waiting.
    ///
    /// Roots are compared after canonicalization, so two spellings of the same
    /// directory conflict.
    pub fn acquire(root: &Path) -> Result<Self, RootBusyError> {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut active = ACTIVE_ROOTS
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(RootBusyError { root: key });
        }
        debug!(root = %key.display(), "root lock acquired");
        Ok(Self { root: key })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        let mut active = ACTIVE_ROOTS
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        active.remove(&self.root);
        debug!(root = %self.root.display(), "root lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_fails_until_release() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = RootLock::acquire(temp.path()).expect("first");
        let err = RootLock::acquire(temp.path()).unwrap_err();
        assert!(err.to_string().contains("already running"));
        drop(first);
        RootLock::acquire(temp.path()).expect("after release");
    }

    #[test]
    fn equivalent_paths_conflict() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("p")).expect("mkdir");
        let _held = RootLock::acquire(&temp.path().join("p")).expect("first");
        assert!(RootLock::acquire(&temp.path().join("p/../p")).is_err());
    }

    #[test]
    fn distinct_roots_do_not_conflict() {
        let a = tempfile::tempdir().expect("tempdir");
        let b = tempfile::tempdir().expect("tempdir");
        let _a = RootLock::acquire(a.path()).expect("a");
        let _b = RootLock::acquire(b.path()).expect("b");
    }
}
