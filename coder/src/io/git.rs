//! Git adapter for change tracking.
//!
//! Snapshots are taken through a private index file so the user's index,
//! branches and history are never touched.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True if the working directory is inside a git work tree.
    pub fn is_work_tree(&self) -> Result<bool> {
        let output = self.run(&["rev-parse", "--is-inside-work-tree"], None)?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    /// Absolute path of the repository's git directory.
    pub fn git_dir(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--absolute-git-dir"], None)?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Hash the current working tree (respecting `.gitignore`) into a tree object.
    ///
    /// Paths matching `exclude` pathspecs are left out. Uses `index_file` as a
    /// scratch index instead of the repository's own.
    #[instrument(skip_all, fields(index = %index_file.display()))]
    pub fn snapshot_tree(&self, index_file: &Path, exclude: &[&str]) -> Result<String> {
        let mut args = vec!["add", "--all", "--", "."];
        let excludes: Vec<String> = exclude.iter().map(|p| format!(":(exclude){p}")).collect();
        args.extend(excludes.iter().map(String::as_str));
        self.run_checked(&args, Some(index_file))?;
        let tree = self.run_capture(&["write-tree"], Some(index_file))?;
        let tree = tree.trim().to_string();
        debug!(tree = %tree, "working tree snapshot");
        Ok(tree)
    }

    /// Whether `tree` names a tree object in the repository's object store.
    pub fn has_tree(&self, tree: &str) -> Result<bool> {
        let spec = format!("{tree}^{{tree}}");
        Ok(self.run(&["cat-file", "-e", &spec], None)?.status.success())
    }

    /// Paths that differ between two tree objects, sorted.
    pub fn diff_trees(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let out = self.run_capture(
            &["diff-tree", "-r", "--name-only", "--no-renames", from, to],
            None,
        )?;
        let mut paths: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn run_capture(&self, args: &[&str], index_file: Option<&Path>) -> Result<String> {
        let output = self.run_checked(args, index_file)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str], index_file: Option<&Path>) -> Result<Output> {
        let output = self.run(args, index_file)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str], index_file: Option<&Path>) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        if let Some(index) = index_file {
            cmd.env("GIT_INDEX_FILE", index);
        }
        cmd.output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo(root: &Path) {
        let status = Command::new("git")
            .args(["init", "-q"])
            .current_dir(root)
            .status()
            .expect("git init");
        assert!(status.success());
    }

    #[test]
    fn snapshot_diff_reports_changed_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        init_repo(root);
        fs::write(root.join("a.txt"), "one").expect("write a");
        let git = Git::new(root);
        assert!(git.is_work_tree().expect("work tree"));
        let index = git.git_dir().expect("git dir").join("test.index");

        let before = git.snapshot_tree(&index, &[]).expect("snapshot");
        fs::write(root.join("a.txt"), "two").expect("rewrite a");
        fs::write(root.join("b.txt"), "new").expect("write b");
        let after = git.snapshot_tree(&index, &[]).expect("snapshot");

        let changed = git.diff_trees(&before, &after).expect("diff");
        assert_eq!(changed, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn snapshot_honours_excludes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        init_repo(root);
        let git = Git::new(root);
        let index = git.git_dir().expect("git dir").join("test.index");

        let before = git.snapshot_tree(&index, &[".coder"]).expect("snapshot");
        fs::create_dir_all(root.join(".coder")).expect("mkdir");
        fs::write(root.join(".coder/log.jsonl"), "{}\n").expect("write log");
        let after = git.snapshot_tree(&index, &[".coder"]).expect("snapshot");

        assert!(git.diff_trees(&before, &after).expect("diff").is_empty());
    }

    #[test]
    fn has_tree_knows_written_snapshots() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        init_repo(root);
        fs::write(root.join("a.txt"), "one").expect("write a");
        let git = Git::new(root);
        let index = git.git_dir().expect("git dir").join("test.index");

        let tree = git.snapshot_tree(&index, &[]).expect("snapshot");
        assert!(git.has_tree(&tree).expect("check"));
        assert!(
            !git.has_tree("0123456789abcdef0123456789abcdef01234567")
                .expect("check")
        );
    }
}
