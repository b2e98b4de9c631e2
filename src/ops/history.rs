use std::ops::Range;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::task::{FieldKey, Task};
use crate::parse::fields::{format_field_line, is_field_line};

const HISTORY_OPEN: &str = "<!-- History";
const COMMENT_CLOSE: &str = "-->";

/// One audit line: when, who, what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
}

impl HistoryEntry {
    pub fn new(actor: &str, action: impl Into<String>) -> Self {
        HistoryEntry {
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.into(),
        }
    }

    /// `2026-10-18T14:03:00Z | sam | moved from To Do to Done`
    pub fn to_line(&self) -> String {
        format!(
            "{} | {} | {}",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.actor,
            self.action
        )
    }
}

/// Value for the Closed field: `2026-10-18 by sam`
pub fn closed_value(date: NaiveDate, actor: &str) -> String {
    format!("{} by {}", date.format("%Y-%m-%d"), actor)
}

/// Line range of the history comment in a task span, closing line included.
/// An unclosed block runs to the end of the span.
pub fn history_block(lines: &[String]) -> Option<Range<usize>> {
    let open = lines.iter().position(|l| l.contains(HISTORY_OPEN))?;
    let opens_and_closes = lines[open]
        .find(HISTORY_OPEN)
        .is_some_and(|pos| lines[open][pos..].contains(COMMENT_CLOSE));
    if opens_and_closes {
        return Some(open..open + 1);
    }
    let close = lines[open + 1..]
        .iter()
        .position(|l| l.contains(COMMENT_CLOSE))
        .map(|i| open + 1 + i);
    Some(match close {
        Some(close) => open..close + 1,
        None => open..lines.len(),
    })
}

/// Append `entry` to the task's history block, creating the block if needed.
/// Existing entries are never touched.
pub fn append_history(task: &mut Task, entry: &str) {
    let lines = &mut task.source_text;
    match history_block(lines) {
        None => {
            let keep = lines
                .iter()
                .rposition(|l| !l.trim().is_empty())
                .map_or(0, |i| i + 1);
            lines.truncate(keep);
            lines.push(format!("{}:", HISTORY_OPEN));
            lines.push(entry.to_string());
            lines.push(COMMENT_CLOSE.to_string());
        }
        Some(block) => {
            let last = block.end - 1;
            if block.len() == 1 {
                // `<!-- History: a | b | c -->` on one line: open it up
                let line = lines[last].clone();
                let marker_end = line.find(HISTORY_OPEN).unwrap_or(0) + HISTORY_OPEN.len();
                let inner = &line[marker_end..];
                let inner = inner.strip_prefix(':').unwrap_or(inner);
                let inner = inner.split(COMMENT_CLOSE).next().unwrap_or("").trim();
                let mut replacement = vec![format!("{}:", &line[..marker_end])];
                if !inner.is_empty() {
                    replacement.push(inner.to_string());
                }
                replacement.push(entry.to_string());
                replacement.push(COMMENT_CLOSE.to_string());
                lines.splice(last..=last, replacement);
            } else if let Some(pos) = lines[last].find(COMMENT_CLOSE) {
                let before = lines[last][..pos].trim().to_string();
                if before.is_empty() {
                    lines.insert(last, entry.to_string());
                } else {
                    let replacement = vec![before, entry.to_string(), COMMENT_CLOSE.to_string()];
                    lines.splice(last..=last, replacement);
                }
            } else {
                // Unclosed block: add after its last entry and close it
                let end = lines[block.clone()]
                    .iter()
                    .rposition(|l| !l.trim().is_empty())
                    .map_or(block.start + 1, |i| block.start + i + 1);
                lines.splice(end..end, [entry.to_string(), COMMENT_CLOSE.to_string()]);
            }
        }
    }
    task.history.push(entry.to_string());
}

/// Where a new field line goes: after the last field line outside the
/// history block, or right under the header.
pub fn field_insert_index(task: &Task) -> usize {
    let history = history_block(&task.source_text);
    task.source_text
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(i, l)| !history.as_ref().is_some_and(|h| h.contains(i)) && is_field_line(l))
        .map(|(i, _)| i + 1)
        .last()
        .unwrap_or(1)
}

/// Add `**Closed**: <value>` once. Returns false if the task was already closed.
pub fn ensure_closed_field(task: &mut Task, value: &str) -> bool {
    if task.metadata.contains_key(&FieldKey::Closed) {
        return false;
    }
    let at = field_insert_index(task).min(task.source_text.len());
    task.source_text
        .insert(at, format_field_line(&[(FieldKey::Closed.label(), value)]));
    task.metadata.insert(FieldKey::Closed, value.to_string());
    true
}
