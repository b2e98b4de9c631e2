use chrono::Local;
use tracing::debug;

use crate::model::board::Board;
use crate::model::config::EngineConfig;
use crate::model::task::{FieldKey, Task, header_line, id_number};
use crate::ops::history::{
    HistoryEntry, append_history, closed_value, ensure_closed_field, field_insert_index,
    history_block,
};
use crate::ops::id_alloc::{format_task_id, is_sentinel_line};
use crate::parse::board_parser::{HISTORY_OPEN, classify_heading, parse_task_header};
use crate::parse::fields::{
    format_field_line, is_field_line, remove_field_from_line, set_field_in_line,
    split_field_pairs,
};

/// Error type for task operations
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("invalid text: {0}")]
    InvalidText(String),
}

/// Where to put a task inside a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    Top,
    Bottom,
    /// Zero-based slot; past the end means bottom
    Index(usize),
    /// Right after the task with this id
    After(String),
}

/// Input for `create_task`
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub fields: Vec<(FieldKey, String)>,
    pub body: Vec<String>,
}

/// Input for `update_task`. `None` leaves a part alone; a field set to
/// `None` is removed.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub fields: Vec<(FieldKey, Option<String>)>,
    pub body: Option<Vec<String>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.fields.is_empty() && self.body.is_none()
    }
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// Create a task in `column` and return its id. Allocates from the board's
/// sequence; the sentinel is stamped when the board is rebuilt.
pub fn create_task(
    board: &mut Board,
    column: &str,
    new: NewTask,
    position: InsertPosition,
    actor: &str,
) -> Result<String, TaskError> {
    check_inline("actor", actor)?;
    check_inline("title", &new.title)?;
    for (key, value) in &new.fields {
        check_field_value(*key, value)?;
    }
    check_body(&new.body)?;

    let col = board
        .column_index(column)
        .ok_or_else(|| TaskError::ColumnNotFound(column.to_string()))?;
    let column_title = board.columns[col].title.clone();
    let slot = resolve_position(&board.columns[col].tasks, &position)?;

    let id = format_task_id(board.allocate_id());
    let mut task = Task::new(id.clone(), new.title.trim().to_string());

    let mut fields = new.fields;
    if !fields.iter().any(|(k, _)| *k == FieldKey::Creator) {
        fields.push((FieldKey::Creator, actor.to_string()));
    }
    for chunk in fields.chunks(2) {
        let pairs: Vec<(&str, &str)> = chunk.iter().map(|(k, v)| (k.label(), v.as_str())).collect();
        task.source_text.push(format_field_line(&pairs));
    }
    for (key, value) in fields {
        task.metadata.insert(key, value);
    }
    write_body(&mut task, new.body);

    append_history(
        &mut task,
        &HistoryEntry::new(actor, format!("created in {}", column_title)).to_line(),
    );

    board.columns[col].tasks.insert(slot, task);
    board.reindex();
    debug!(task = %id, column = %column_title, "created task");
    Ok(id)
}

/// Move a task to `column` (or reorder it within its own column) and return
/// its id as written in the board. A column change is recorded in the task
/// history; entering a terminal column stamps the Closed field the first time.
pub fn move_task(
    board: &mut Board,
    task_id: &str,
    column: &str,
    position: InsertPosition,
    actor: &str,
    config: &EngineConfig,
) -> Result<String, TaskError> {
    check_inline("actor", actor)?;
    let to = board
        .column_index(column)
        .ok_or_else(|| TaskError::ColumnNotFound(column.to_string()))?;
    let loc = board
        .locate(task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
    let id = board.columns[loc.column].tasks[loc.position].id.clone();
    if let InsertPosition::After(anchor) = &position
        && board.canonical_id(anchor) == Some(id.as_str())
    {
        return Err(TaskError::InvalidPosition(format!(
            "cannot place {} after itself",
            id
        )));
    }

    let mut task = board.columns[loc.column].tasks.remove(loc.position);
    let slot = match resolve_position(&board.columns[to].tasks, &position) {
        Ok(slot) => slot,
        Err(e) => {
            board.columns[loc.column].tasks.insert(loc.position, task);
            return Err(e);
        }
    };

    if loc.column != to {
        let from_title = &board.columns[loc.column].title;
        let to_title = &board.columns[to].title;
        append_history(
            &mut task,
            &HistoryEntry::new(actor, format!("moved from {} to {}", from_title, to_title))
                .to_line(),
        );
        if config.is_terminal(to_title) {
            ensure_closed_field(&mut task, &closed_value(Local::now().date_naive(), actor));
        }
    }

    board.columns[to].tasks.insert(slot, task);
    board.reindex();
    Ok(id)
}

/// Apply `update` to a task. Returns the names of the parts that changed.
pub fn update_task(
    board: &mut Board,
    task_id: &str,
    update: TaskUpdate,
    actor: &str,
) -> Result<Vec<String>, TaskError> {
    check_inline("actor", actor)?;
    if let Some(title) = &update.title {
        check_inline("title", title)?;
    }
    for (key, value) in &update.fields {
        if let Some(value) = value {
            check_field_value(*key, value)?;
        }
    }
    if let Some(body) = &update.body {
        check_body(body)?;
    }

    let task = board
        .task_mut(task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
    let mut changed = Vec::new();

    if let Some(title) = update.title {
        let title = title.trim().to_string();
        if title != task.title {
            task.source_text[0] = header_line(&task.id, &title);
            task.title = title;
            changed.push("title".to_string());
        }
    }

    for (key, value) in update.fields {
        let did_change = match value {
            Some(value) => set_field(task, key, value.trim()),
            None => remove_field(task, key),
        };
        if did_change {
            changed.push(key.to_string());
        }
    }

    if let Some(body) = update.body
        && body != task.body_lines
    {
        replace_body(task, body);
        changed.push("body".to_string());
    }

    if !changed.is_empty() {
        append_history(
            task,
            &HistoryEntry::new(actor, format!("updated {}", changed.join(", "))).to_line(),
        );
    }
    Ok(changed)
}

/// Remove a task from the board and hand it back. The sequence is raised
/// past the deleted number first, so the rebuild records it.
pub fn delete_task(board: &mut Board, task_id: &str) -> Result<Task, TaskError> {
    let loc = board
        .locate(task_id)
        .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
    board.reserve_numbers_in_use();
    let task = board.columns[loc.column].tasks.remove(loc.position);
    board.reindex();
    Ok(task)
}

// ---------------------------------------------------------------------------
// Input checks
// ---------------------------------------------------------------------------

/// Text that lands on a single line of the span (titles, field values)
fn check_inline(what: &str, text: &str) -> Result<(), TaskError> {
    if text.contains(['\n', '\r']) {
        return Err(TaskError::InvalidText(format!(
            "{} cannot contain line breaks",
            what
        )));
    }
    if text.contains(HISTORY_OPEN) || is_sentinel_line(text) {
        return Err(TaskError::InvalidText(format!(
            "{} cannot contain a board marker comment",
            what
        )));
    }
    Ok(())
}

/// A value must read back as exactly one pair of its own key
fn check_field_value(key: FieldKey, value: &str) -> Result<(), TaskError> {
    check_inline(key.label(), value)?;
    if split_field_pairs(&format_field_line(&[(key.label(), value.trim())])).len() != 1 {
        return Err(TaskError::InvalidText(format!(
            "{} value cannot contain another field",
            key.label()
        )));
    }
    Ok(())
}

/// Body lines must not parse back as headings, fields or markers
fn check_body(body: &[String]) -> Result<(), TaskError> {
    for line in body {
        check_inline("body line", line)?;
        if classify_heading(line).is_some()
            || parse_task_header(line).is_some()
            || is_field_line(line)
        {
            return Err(TaskError::InvalidText(format!(
                "body line would be read as board structure: {}",
                line.trim()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Span editing
// ---------------------------------------------------------------------------

/// Set a field inside the span. Every line carrying the key is rewritten;
/// if none does, a new field line is added after the existing ones.
pub fn set_field(task: &mut Task, key: FieldKey, value: &str) -> bool {
    if task.field(key) == Some(value) {
        return false;
    }
    let mut found = false;
    for idx in field_line_indices(task) {
        if let Some(line) = set_field_in_line(&task.source_text[idx], key, value) {
            task.source_text[idx] = line;
            found = true;
        }
    }
    if !found {
        let at = field_insert_index(task).min(task.source_text.len());
        task.source_text
            .insert(at, format_field_line(&[(key.label(), value)]));
    }
    task.metadata.insert(key, value.to_string());
    true
}

/// Remove a field from the span. Lines left empty are dropped.
pub fn remove_field(task: &mut Task, key: FieldKey) -> bool {
    let mut found = false;
    for idx in field_line_indices(task).into_iter().rev() {
        match remove_field_from_line(&task.source_text[idx], key) {
            Some(Some(line)) => task.source_text[idx] = line,
            Some(None) => {
                task.source_text.remove(idx);
            }
            None => continue,
        }
        found = true;
    }
    task.metadata.shift_remove(&key);
    found
}

/// Replace the free-text body, keeping the header, field lines and history
fn replace_body(task: &mut Task, body: Vec<String>) {
    let history = history_block(&task.source_text);
    let fields: Vec<String> = field_line_indices(task)
        .into_iter()
        .map(|i| task.source_text[i].clone())
        .collect();
    let history_lines: Vec<String> = history
        .map(|h| task.source_text[h].to_vec())
        .unwrap_or_default();

    task.source_text.truncate(1);
    task.source_text.extend(fields);
    task.body_lines.clear();
    write_body(task, body);
    if !history_lines.is_empty() {
        task.source_text.extend(history_lines);
    }
}

fn write_body(task: &mut Task, body: Vec<String>) {
    if body.iter().all(|l| l.trim().is_empty()) {
        return;
    }
    task.source_text.push(String::new());
    for line in body {
        if !line.trim().is_empty() {
            task.body_lines.push(line.trim_end().to_string());
        }
        task.source_text.push(line);
    }
}

/// Indices of field lines outside the history block (header excluded)
fn field_line_indices(task: &Task) -> Vec<usize> {
    let history = history_block(&task.source_text);
    (1..task.source_text.len())
        .filter(|i| !history.as_ref().is_some_and(|h| h.contains(i)))
        .filter(|&i| is_field_line(&task.source_text[i]))
        .collect()
}

fn resolve_position(tasks: &[Task], position: &InsertPosition) -> Result<usize, TaskError> {
    match position {
        InsertPosition::Top => Ok(0),
        InsertPosition::Bottom => Ok(tasks.len()),
        InsertPosition::Index(i) => Ok((*i).min(tasks.len())),
        InsertPosition::After(anchor) => tasks
            .iter()
            .position(|t| &t.id == anchor)
            .or_else(|| {
                let number = id_number(anchor)?;
                tasks.iter().position(|t| t.number() == Some(number))
            })
            .map(|i| i + 1)
            .ok_or_else(|| TaskError::InvalidPosition(format!("{} is not in that column", anchor))),
    }
}
