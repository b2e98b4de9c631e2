use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use super::task::{Task, id_number};

/// Marker used when a column is created without one
pub const DEFAULT_MARKER: &str = "📋";

/// A column of tasks, in file order
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    /// Slug derived from the title
    pub id: String,
    /// Title text after the emoji marker; the join key for rebuilds
    pub title: String,
    /// The emoji marker from the header line
    pub marker: String,
    /// Tasks in display order
    pub tasks: Vec<Task>,

    /// Task spans as they were parsed, used to detect changed columns
    #[serde(skip)]
    pub source_spans: Vec<Vec<String>>,
    /// Whether a header for this column existed in the parsed source
    #[serde(skip)]
    pub from_source: bool,
}

impl Column {
    /// A fresh column with no source (it will be appended on rebuild)
    pub fn new(marker: &str, title: &str) -> Self {
        Column {
            id: slugify(title),
            title: title.to_string(),
            marker: marker.to_string(),
            tasks: Vec::new(),
            source_spans: Vec::new(),
            from_source: false,
        }
    }

    /// True when the task list differs from what was parsed
    pub fn is_modified(&self) -> bool {
        self.tasks.len() != self.source_spans.len()
            || self
                .tasks
                .iter()
                .zip(&self.source_spans)
                .any(|(t, s)| &t.source_text != s)
    }

    /// The `## <marker> <title>` header line
    pub fn header_line(&self) -> String {
        format!("## {} {}", self.marker, self.title)
    }
}

/// Where a task lives inside a board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLocation {
    pub column: usize,
    pub position: usize,
}

/// A parsed board document
#[derive(Debug, Clone, Default)]
pub struct Board {
    /// Columns in file order
    pub columns: Vec<Column>,
    /// `**Key**: value` pairs from the configuration section
    pub config: IndexMap<String, String>,
    /// Last issued task number, as read from the sentinel (0 if absent)
    pub last_task_id: u32,
    /// Sentinel value at parse time
    pub(crate) parsed_last_task_id: u32,
    index: HashMap<String, TaskLocation>,
}

impl Board {
    pub fn new(columns: Vec<Column>, config: IndexMap<String, String>, last_task_id: u32) -> Self {
        let mut board = Board {
            columns,
            config,
            last_task_id,
            parsed_last_task_id: last_task_id,
            index: HashMap::new(),
        };
        board.reindex();
        board
    }

    /// Rebuild the id → location index. Call after moving tasks around.
    pub fn reindex(&mut self) {
        self.index.clear();
        for (ci, column) in self.columns.iter().enumerate() {
            for (ti, task) in column.tasks.iter().enumerate() {
                self.index.entry(task.id.clone()).or_insert(TaskLocation {
                    column: ci,
                    position: ti,
                });
            }
        }
    }

    /// Find a task's location. Falls back to a scan if the index is stale.
    /// An id that matches no task exactly is tried by number, so `TASK-002`
    /// finds a task written as `TASK-2`.
    pub fn locate(&self, task_id: &str) -> Option<TaskLocation> {
        if let Some(loc) = self.index.get(task_id)
            && self
                .columns
                .get(loc.column)
                .and_then(|c| c.tasks.get(loc.position))
                .is_some_and(|t| t.id == task_id)
        {
            return Some(*loc);
        }
        self.find_location(|t| t.id == task_id).or_else(|| {
            let number = id_number(task_id)?;
            self.find_location(|t| t.number() == Some(number))
        })
    }

    fn find_location<P: Fn(&Task) -> bool>(&self, pred: P) -> Option<TaskLocation> {
        self.columns.iter().enumerate().find_map(|(ci, c)| {
            c.tasks.iter().position(&pred).map(|ti| TaskLocation {
                column: ci,
                position: ti,
            })
        })
    }

    /// The id as written in the board for any spelling `locate` accepts
    pub fn canonical_id(&self, task_id: &str) -> Option<&str> {
        self.task(task_id).map(|t| t.id.as_str())
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        let loc = self.locate(task_id)?;
        self.columns[loc.column].tasks.get(loc.position)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        let loc = self.locate(task_id)?;
        self.columns[loc.column].tasks.get_mut(loc.position)
    }

    /// Look up a column by title (case-insensitive) or by slug
    pub fn column_index(&self, title_or_id: &str) -> Option<usize> {
        let needle = title_or_id.trim();
        let slug = slugify(needle);
        self.columns
            .iter()
            .position(|c| c.title.eq_ignore_ascii_case(needle))
            .or_else(|| self.columns.iter().position(|c| c.id == slug))
    }

    pub fn column(&self, title_or_id: &str) -> Option<&Column> {
        self.column_index(title_or_id).map(|i| &self.columns[i])
    }

    pub fn column_mut(&mut self, title_or_id: &str) -> Option<&mut Column> {
        self.column_index(title_or_id).map(|i| &mut self.columns[i])
    }

    /// Return the column's index, appending a new empty column if missing
    pub fn ensure_column(&mut self, marker: &str, title: &str) -> usize {
        if let Some(idx) = self.column_index(title) {
            return idx;
        }
        self.columns.push(Column::new(marker, title));
        self.columns.len() - 1
    }

    /// Hand out the next task number. Numbers already used by tasks in the
    /// board are skipped even when the sentinel lags behind them.
    pub fn allocate_id(&mut self) -> u32 {
        self.reserve_numbers_in_use();
        self.last_task_id = self.last_task_id.saturating_add(1);
        self.last_task_id
    }

    /// Raise the sequence to cover every task number in the board, so a
    /// number freed by a delete is never handed out again.
    pub fn reserve_numbers_in_use(&mut self) {
        let highest = self.tasks().filter_map(Task::number).max().unwrap_or(0);
        self.last_task_id = self.last_task_id.max(highest);
    }

    /// Whether the sequence moved since parsing
    pub fn sequence_advanced(&self) -> bool {
        self.last_task_id != self.parsed_last_task_id
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.columns.iter().flat_map(|c| c.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}

/// Derive a column id: lower-case, runs of non-alphanumerics become one `-`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_sep = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(columns: &[(&str, &[&str])]) -> Board {
        let cols = columns
            .iter()
            .map(|(title, ids)| {
                let mut col = Column::new(DEFAULT_MARKER, title);
                col.tasks = ids
                    .iter()
                    .map(|id| Task::new(id.to_string(), format!("Task {}", id)))
                    .collect();
                col
            })
            .collect();
        Board::new(cols, IndexMap::new(), 0)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("In Progress"), "in-progress");
        assert_eq!(slugify("  Q&A / Review!! "), "q-a-review");
        assert_eq!(slugify("Done"), "done");
        assert_eq!(slugify("v2.0 -- Release"), "v2-0-release");
    }

    #[test]
    fn test_locate_and_stale_index() {
        let mut board = board_with(&[("To Do", &["TASK-001", "TASK-002"]), ("Done", &[])]);
        assert_eq!(
            board.locate("TASK-002"),
            Some(TaskLocation {
                column: 0,
                position: 1
            })
        );

        // Mutate without reindexing: lookup still finds the task
        let task = board.columns[0].tasks.remove(0);
        board.columns[1].tasks.push(task);
        assert_eq!(
            board.locate("TASK-001"),
            Some(TaskLocation {
                column: 1,
                position: 0
            })
        );
        assert_eq!(board.task("TASK-002").map(|t| t.id.as_str()), Some("TASK-002"));
        assert!(board.locate("TASK-999").is_none());
    }

    #[test]
    fn test_locate_ignores_zero_padding() {
        let board = board_with(&[("To Do", &["TASK-2", "TASK-010"]), ("Done", &["TASK-002"])]);
        // An exact spelling wins over a numeric match
        assert_eq!(board.locate("TASK-002").map(|l| l.column), Some(1));
        assert_eq!(board.canonical_id("TASK-10"), Some("TASK-010"));

        let board = board_with(&[("To Do", &["TASK-2"])]);
        assert_eq!(board.canonical_id("TASK-002"), Some("TASK-2"));
        assert_eq!(board.canonical_id("TASK-0002"), Some("TASK-2"));
        assert!(board.locate("TASK-003").is_none());
    }

    #[test]
    fn test_reserve_numbers_in_use() {
        let mut board = board_with(&[("To Do", &["TASK-001", "TASK-002"])]);
        board.reserve_numbers_in_use();
        assert_eq!(board.last_task_id, 2);
        assert!(board.sequence_advanced());

        let mut board = Board::new(Vec::new(), IndexMap::new(), 9);
        board.reserve_numbers_in_use();
        assert_eq!(board.last_task_id, 9);
        assert!(!board.sequence_advanced());
    }

    #[test]
    fn test_column_lookup_by_title_or_slug() {
        let board = board_with(&[("In Progress", &[])]);
        assert_eq!(board.column_index("in progress"), Some(0));
        assert_eq!(board.column_index("in-progress"), Some(0));
        assert_eq!(board.column_index("Done"), None);
    }

    #[test]
    fn test_allocate_id_advances_sequence() {
        let mut board = Board::new(Vec::new(), IndexMap::new(), 41);
        assert!(!board.sequence_advanced());
        assert_eq!(board.allocate_id(), 42);
        assert_eq!(board.allocate_id(), 43);
        assert!(board.sequence_advanced());
    }

    #[test]
    fn test_allocate_id_skips_numbers_in_use() {
        let mut board = board_with(&[("To Do", &["TASK-009", "TASK-002"])]);
        assert_eq!(board.last_task_id, 0);
        assert_eq!(board.allocate_id(), 10);
        assert_eq!(board.allocate_id(), 11);
    }

    #[test]
    fn test_ensure_column_is_idempotent() {
        let mut board = board_with(&[("To Do", &[])]);
        assert_eq!(board.ensure_column("✅", "Done"), 1);
        assert_eq!(board.ensure_column("✅", "done"), 1);
        assert!(!board.columns[1].from_source);
    }

    #[test]
    fn test_column_modified_detection() {
        let mut col = Column::new(DEFAULT_MARKER, "To Do");
        col.tasks.push(Task::new("TASK-001".into(), "A".into()));
        col.source_spans = col.tasks.iter().map(|t| t.source_text.clone()).collect();
        assert!(!col.is_modified());
        col.tasks[0].source_text.push("more".into());
        assert!(col.is_modified());
    }
}
