use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::parse::span::SourceSpan;

/// Metadata keys lifted out of a task's bold field lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKey {
    Priority,
    Project,
    Assigned,
    Creator,
    Tags,
    Closed,
}

impl FieldKey {
    pub const ALL: [FieldKey; 6] = [
        FieldKey::Priority,
        FieldKey::Project,
        FieldKey::Assigned,
        FieldKey::Creator,
        FieldKey::Tags,
        FieldKey::Closed,
    ];

    /// The key as written between the `**` markers
    pub fn label(self) -> &'static str {
        match self {
            FieldKey::Priority => "Priority",
            FieldKey::Project => "Project",
            FieldKey::Assigned => "Assigned",
            FieldKey::Creator => "Creator",
            FieldKey::Tags => "Tags",
            FieldKey::Closed => "Closed",
        }
    }

    /// Recognize a field label, ignoring case and surrounding whitespace
    pub fn from_label(label: &str) -> Option<FieldKey> {
        let label = label.trim();
        FieldKey::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label().to_lowercase())
    }
}

/// A task with its recognized fields and the verbatim lines it occupies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Internal id like `TASK-007`
    pub id: String,
    /// Title text from the `### TASK-NNN | title` header
    pub title: String,
    /// Recognized fields, in the order first seen
    pub metadata: IndexMap<FieldKey, String>,
    /// Audit entries from the `<!-- History: ... -->` block, oldest first
    pub history: Vec<String>,
    /// Free-text lines that are neither fields nor structural markers
    pub body_lines: Vec<String>,

    // --- Source tracking ---
    /// The lines this task occupies, header first. This is what gets emitted.
    #[serde(skip)]
    pub source_text: Vec<String>,
    /// Line range in the source the task was parsed from
    #[serde(skip)]
    pub source_lines: Option<SourceSpan>,
}

impl Task {
    /// Create a task with only a header line (no source position)
    pub fn new(id: String, title: String) -> Self {
        let header = header_line(&id, &title);
        Task {
            id,
            title,
            metadata: IndexMap::new(),
            history: Vec::new(),
            body_lines: Vec::new(),
            source_text: vec![header],
            source_lines: None,
        }
    }

    pub fn field(&self, key: FieldKey) -> Option<&str> {
        self.metadata.get(&key).map(|s| s.as_str())
    }

    /// Numeric part of the id (`TASK-042` → 42)
    pub fn number(&self) -> Option<u32> {
        id_number(&self.id)
    }

    /// The span as a single string, exactly as it will be written
    pub fn raw_span(&self) -> String {
        self.source_text.join("\n")
    }

    /// The span without trailing blank lines
    pub fn trimmed_span(&self) -> &[String] {
        let end = self
            .source_text
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .map_or(0, |i| i + 1);
        &self.source_text[..end]
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.source_text == other.source_text
    }
}

impl Eq for Task {}

/// Numeric part of an internal id, whatever its zero padding
/// (`TASK-2` and `TASK-002` both → 2)
pub fn id_number(id: &str) -> Option<u32> {
    let digits = id.trim().strip_prefix("TASK-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Format a task header line
pub fn header_line(id: &str, title: &str) -> String {
    format!("### {} | {}", id, title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key_labels() {
        assert_eq!(FieldKey::from_label("priority"), Some(FieldKey::Priority));
        assert_eq!(FieldKey::from_label(" Assigned "), Some(FieldKey::Assigned));
        assert_eq!(FieldKey::from_label("Due"), None);
        assert_eq!(FieldKey::Closed.to_string(), "closed");
    }

    #[test]
    fn test_new_task_has_header() {
        let task = Task::new("TASK-003".into(), "Write docs".into());
        assert_eq!(task.raw_span(), "### TASK-003 | Write docs");
        assert_eq!(task.number(), Some(3));
    }

    #[test]
    fn test_id_number_ignores_padding() {
        assert_eq!(id_number("TASK-2"), Some(2));
        assert_eq!(id_number("TASK-002"), Some(2));
        assert_eq!(id_number("TASK-1234"), Some(1234));
        assert_eq!(id_number("TASK-+2"), None);
        assert_eq!(id_number("ACME-002"), None);
        assert_eq!(id_number("TASK-"), None);
    }

    #[test]
    fn test_trimmed_span_drops_trailing_blanks() {
        let mut task = Task::new("TASK-001".into(), "A".into());
        task.source_text.push("body".into());
        task.source_text.push(String::new());
        task.source_text.push("  ".into());
        assert_eq!(task.trimmed_span().len(), 2);
    }
}
