//! Append-only question/answer audit log.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Default audit log file name.
pub const DEFAULT_AUDIT_LOG: &str = "askdocs.log";

/// Text file receiving one entry per answered, unmatched or failed question.
///
/// Each entry is written with a single `write_all` so concurrent writers do
/// not interleave within an entry. Write failures are logged and swallowed.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Appends to `path`, creating it on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a successful (or "no match") answer.
    pub fn record_answer(&self, question: &str, answer: &str) {
        self.append(&format!("Question: {question}, Answer: {answer}"));
    }

    /// Records a failed question.
    pub fn record_failure(&self, question: &str, error: &dyn Display) {
        self.append(&format!("Question: {question}, Exception: {error}"));
    }

    fn append(&self, entry: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(format!("{entry}\n\n").as_bytes()));
        if let Err(err) = result {
            warn!(path = %self.path.display(), error = %err, "failed to append audit entry");
        }
    }
}
