//! Append-only audit log at `<project>/.coder/log.jsonl`.
//!
//! One JSON object per line, no enclosing array. Request lines carry the
//! instruction, id and timestamp; completion lines nest the request and the
//! final report. Lines are never rewritten or removed.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::types::{CompletionRecord, ModificationRequest};

/// Project-relative directory holding coder artifacts.
pub const AUDIT_DIR: &str = ".coder";
const AUDIT_FILE: &str = "log.jsonl";

/// Failure to append to or read the audit log.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("audit log line {line} in {path} is not a valid entry: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One line of the audit log.
///
/// Shapes are told apart by their fields, so the line carries no tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditEntry {
    Completion(CompletionRecord),
    Request(ModificationRequest),
}

/// Destination for request and completion records.
pub trait AuditSink {
    fn record_request(&self, request: &ModificationRequest) -> Result<(), AuditError>;
    fn record_completion(&self, completion: &CompletionRecord) -> Result<(), AuditError>;
}

/// Line-delimited JSON log inside a project root.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn for_project(root: &Path) -> Self {
        Self {
            path: root.join(AUDIT_DIR).join(AUDIT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the log on first use.
    ///
    /// The line is written with a single `write_all` on a file opened in
    /// append mode, so concurrent writers never interleave partial lines.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        file.write_all(line.as_bytes())
            .map_err(|source| self.io_error(source))?;
        debug!(bytes = line.len(), "audit entry appended");
        Ok(())
    }

    /// Read every entry in file order. A missing log reads as empty.
    pub fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path).map_err(|source| self.io_error(source))?;
        let mut entries = Vec::new();
        for (index, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| self.io_error(source))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|source| AuditError::Parse {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn io_error(&self, source: io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl AuditSink for AuditLog {
    fn record_request(&self, request: &ModificationRequest) -> Result<(), AuditError> {
        self.append(&AuditEntry::Request(request.clone()))
    }

    fn record_completion(&self, completion: &CompletionRecord) -> Result<(), AuditError> {
        self.append(&AuditEntry::Completion(completion.clone()))
    }
}
