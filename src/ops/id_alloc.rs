use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use tracing::warn;

use crate::parse::board_serializer::uses_crlf;

/// The task id sequence lives in a `<!-- Config: Last Task ID: NNN -->`
/// comment inside the board. Read, insert and stamp must all happen under
/// the document lock.
static SENTINEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*Config:\s*Last Task ID:\s*([^>]*?)\s*-->").expect("sentinel pattern")
});

/// State of the sentinel comment in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    Missing,
    /// Present but not a number; carries the raw value
    Malformed(String),
    Value(u32),
}

pub fn read_sentinel(text: &str) -> Sentinel {
    let Some(caps) = SENTINEL_RE.captures(text) else {
        return Sentinel::Missing;
    };
    let raw = caps.get(1).map_or("", |m| m.as_str());
    match raw.parse::<u32>() {
        Ok(n) => Sentinel::Value(n),
        Err(_) => Sentinel::Malformed(raw.to_string()),
    }
}

/// Last issued task number. Missing or malformed sentinels read as 0.
pub fn last_issued_id(text: &str) -> u32 {
    match read_sentinel(text) {
        Sentinel::Value(n) => n,
        Sentinel::Malformed(raw) => {
            warn!(value = %raw, "malformed task id sentinel, counting from 0");
            0
        }
        Sentinel::Missing => 0,
    }
}

/// The number the next created task should get
pub fn next_id(text: &str) -> u32 {
    last_issued_id(text).saturating_add(1)
}

/// Rewrite the sentinel to `value`. A document without one gets it inserted
/// below its `# ` title line, or at the very top.
pub fn stamp_id(text: &str, value: u32) -> String {
    let sentinel = format_sentinel(value);
    if SENTINEL_RE.is_match(text) {
        return SENTINEL_RE.replace(text, NoExpand(&sentinel)).into_owned();
    }

    let eol = if uses_crlf(text) { "\r\n" } else { "\n" };
    let mut lines: Vec<&str> = text.split('\n').collect();
    match lines.iter().position(|l| l.starts_with("# ")) {
        Some(title_idx) => {
            let blank = eol.trim_end_matches('\n');
            let stamped = format!("{}{}", sentinel, blank);
            lines.insert(title_idx + 1, blank);
            lines.insert(title_idx + 2, &stamped);
            lines.join("\n")
        }
        None if text.is_empty() => sentinel,
        None => format!("{}{}{}{}", sentinel, eol, eol, text),
    }
}

pub fn format_sentinel(value: u32) -> String {
    format!("<!-- Config: Last Task ID: {:03} -->", value)
}

/// `7` → `TASK-007`
pub fn format_task_id(number: u32) -> String {
    format!("TASK-{:03}", number)
}

pub fn is_sentinel_line(line: &str) -> bool {
    SENTINEL_RE.is_match(line)
}
