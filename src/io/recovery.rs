use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::io::lock::canonical_key;

/// File name of the recovery log, kept next to the board
pub const RECOVERY_LOG_NAME: &str = ".mdboard-recovery.log";

/// Header written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- mdboard recovery log: append-only
     Board text that could not be saved, and tasks that were deleted.
     Safe to delete once you have what you need. -->

---
";

/// Category of a recovery entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    Write,
    Delete,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::Delete => write!(f, "delete"),
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

impl RecoveryEntry {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} | {}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            out.push_str("\n```text\n");
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out.push_str("\n---\n");
        out
    }
}

/// Recovery log path for a board file
pub fn recovery_log_path(board_path: &Path) -> PathBuf {
    board_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(RECOVERY_LOG_NAME)
}

/// Write `content` to `path` atomically using a temp file + rename.
/// A symlink is written through to its target, and an existing file keeps
/// its permissions.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let target = canonical_key(path);
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    if let Ok(meta) = fs::metadata(&target) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(&target).map_err(|e| e.error)?;
    Ok(())
}

/// Append an entry to the board's recovery log. Failures are only logged.
pub fn log_recovery(board_path: &Path, entry: RecoveryEntry) {
    if let Err(e) = log_recovery_inner(board_path, &entry) {
        warn!(error = %e, "could not write to recovery log");
    }
}

fn log_recovery_inner(board_path: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(board_path);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())
}

/// Keep a deleted task's span in the recovery log
pub fn log_task_deletion(board_path: &Path, task_id: &str, column: &str, task_source: &str) {
    log_recovery(
        board_path,
        RecoveryEntry {
            timestamp: Utc::now(),
            category: RecoveryCategory::Delete,
            description: format!("task {} deleted", task_id),
            fields: vec![
                ("Task".to_string(), task_id.to_string()),
                ("Column".to_string(), column.to_string()),
            ],
            body: task_source.to_string(),
        },
    );
}

/// Keep board text that failed to save in the recovery log
pub fn log_write_failure(board_path: &Path, error: &io::Error, content: &str) {
    log_recovery(
        board_path,
        RecoveryEntry {
            timestamp: Utc::now(),
            category: RecoveryCategory::Write,
            description: "board write failed".to_string(),
            fields: vec![
                ("Target".to_string(), board_path.display().to_string()),
                ("Error".to_string(), error.to_string()),
            ],
            body: content.to_string(),
        },
    );
}
