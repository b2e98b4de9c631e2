use indexmap::IndexMap;
use serde::Serialize;

use crate::model::board::Board;
use crate::model::task::{FieldKey, Task};

const INTERNAL_PREFIX: &str = "TASK";

/// Read-only projection of a board for callers that show it to people,
/// with internal `TASK-NNN` ids mapped to project-scoped display ids.
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub columns: Vec<ColumnView>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub id: String,
    pub title: String,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    /// Display id (`ACME-007`)
    pub id: String,
    /// Internal id (`TASK-007`)
    pub internal_id: String,
    pub title: String,
    /// Line of the task header in the parsed file; absent for new tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub metadata: IndexMap<FieldKey, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<String>,
}

/// Project the board, mapping ids through `display_id` with `prefix`
pub fn serialize_for_display(board: &Board, prefix: Option<&str>) -> BoardView {
    project_board(board, |id| display_id(id, prefix))
}

/// Project the board with a caller-supplied id transform
pub fn project_board<F: Fn(&str) -> String>(board: &Board, to_display: F) -> BoardView {
    BoardView {
        columns: board
            .columns
            .iter()
            .map(|c| ColumnView {
                id: c.id.clone(),
                title: c.title.clone(),
                tasks: c.tasks.iter().map(|t| task_view(t, &to_display)).collect(),
            })
            .collect(),
        config: board.config.clone(),
    }
}

pub fn task_view<F: Fn(&str) -> String>(task: &Task, to_display: &F) -> TaskView {
    TaskView {
        id: to_display(&task.id),
        internal_id: task.id.clone(),
        title: task.title.clone(),
        line: task.source_lines.as_ref().map(|s| s.first_line_number()),
        metadata: task.metadata.clone(),
        history: task.history.clone(),
        body: task.body_lines.clone(),
    }
}

/// `TASK-007` with prefix `acme` → `ACME-007`. Without a prefix the
/// internal id is returned unchanged.
pub fn display_id(internal: &str, prefix: Option<&str>) -> String {
    let prefix = prefix.map(str::trim).filter(|p| !p.is_empty());
    match (prefix, split_id(internal)) {
        (Some(prefix), Some((_, digits))) => format!("{}-{}", prefix.to_uppercase(), digits),
        _ => internal.to_string(),
    }
}

/// Accept an id in internal (`TASK-007`), display (`ACME-007`, any case) or
/// bare numeric (`7`) form and return the internal form.
pub fn normalize_id(input: &str) -> Option<String> {
    let input = input.trim();
    let digits = if input.bytes().all(|b| b.is_ascii_digit()) && !input.is_empty() {
        input
    } else {
        split_id(input)?.1
    };
    if digits.len() >= 3 {
        Some(format!("{}-{}", INTERNAL_PREFIX, digits))
    } else {
        let n: u32 = digits.parse().ok()?;
        Some(format!("{}-{:03}", INTERNAL_PREFIX, n))
    }
}

/// Split `PREFIX-digits` at the last dash
fn split_id(id: &str) -> Option<(&str, &str)> {
    let (prefix, digits) = id.rsplit_once('-')?;
    let prefix_ok = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let digits_ok = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    (prefix_ok && digits_ok).then_some((prefix, digits))
}
