use indexmap::IndexMap;
use tracing::debug;

use crate::model::board::{Board, Column};
use crate::model::task::Task;
use crate::ops::id_alloc::{is_sentinel_line, last_issued_id};
use crate::parse::fields::{extract_fields, is_field_line, parse_config_line};
use crate::parse::span::SourceSpan;

/// Emoji that mark a level-2 heading as a column (base code points; an
/// optional U+FE0F variation selector may follow)
pub const COLUMN_MARKERS: &[&str] = &[
    "📋", "📝", "🚀", "🔄", "👀", "🧪", "✅", "🚫", "⏸", "🗄", "💡", "🐛",
];

/// Marker of the configuration heading
pub const CONFIG_MARKER: &str = "⚙";

const CONFIG_TITLE: &str = "Configuration";
pub const HISTORY_OPEN: &str = "<!-- History";
const COMMENT_CLOSE: &str = "-->";
const VARIATION_SELECTOR: char = '\u{FE0F}';

/// What the parser is currently inside of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    TopLevel,
    Configuration,
    InTask,
    InHistory,
}

/// A level-2 heading the parser cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heading {
    Column { marker: String, title: String },
    Configuration,
}

/// Classification of one line, given the current mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Heading(Heading),
    TaskHeader { id: String, title: String },
    Field,
    /// `<!-- History`, with any entry text on the same line and whether the
    /// comment also closes on that line
    HistoryOpen { inline: Option<String>, closed: bool },
    /// `-->` closing a history block, with any entry text before it
    HistoryClose { inline: Option<String> },
    Sentinel,
    Blank,
    Text,
}

/// Mode after consuming a line of `kind` while in `mode`.
/// `column_open` tells whether a task header would have a column to land in.
pub fn transition(mode: ParseMode, kind: &LineKind, column_open: bool) -> ParseMode {
    match kind {
        LineKind::Heading(Heading::Column { .. }) => ParseMode::TopLevel,
        LineKind::Heading(Heading::Configuration) => ParseMode::Configuration,
        LineKind::TaskHeader { .. } => match mode {
            ParseMode::Configuration => ParseMode::Configuration,
            _ if column_open => ParseMode::InTask,
            _ => ParseMode::TopLevel,
        },
        LineKind::HistoryOpen { closed, .. } if mode == ParseMode::InTask => {
            if *closed {
                ParseMode::InTask
            } else {
                ParseMode::InHistory
            }
        }
        LineKind::HistoryClose { .. } if mode == ParseMode::InHistory => ParseMode::InTask,
        _ => mode,
    }
}

/// Classify a line. Headings win in every mode so that a stray unclosed
/// comment cannot swallow the rest of the board.
pub fn classify_line(line: &str, mode: ParseMode) -> LineKind {
    if let Some(heading) = classify_heading(line) {
        return LineKind::Heading(heading);
    }
    if let Some((id, title)) = parse_task_header(line) {
        return LineKind::TaskHeader { id, title };
    }
    let trimmed = line.trim();
    match mode {
        ParseMode::InHistory => {
            if let Some(pos) = trimmed.find(COMMENT_CLOSE) {
                LineKind::HistoryClose {
                    inline: non_empty(&trimmed[..pos]),
                }
            } else if trimmed.is_empty() {
                LineKind::Blank
            } else {
                LineKind::Text
            }
        }
        _ => {
            if mode == ParseMode::InTask
                && let Some(pos) = trimmed.find(HISTORY_OPEN)
            {
                let after = &trimmed[pos + HISTORY_OPEN.len()..];
                let after = after.strip_prefix(':').unwrap_or(after);
                let (inline, closed) = match after.find(COMMENT_CLOSE) {
                    Some(end) => (non_empty(&after[..end]), true),
                    None => (non_empty(after), false),
                };
                LineKind::HistoryOpen { inline, closed }
            } else if is_sentinel_line(trimmed) {
                LineKind::Sentinel
            } else if is_field_line(trimmed) {
                LineKind::Field
            } else if trimmed.is_empty() {
                LineKind::Blank
            } else {
                LineKind::Text
            }
        }
    }
}

/// Recognize a column or configuration heading: `## <marker> <title>`
pub fn classify_heading(line: &str) -> Option<Heading> {
    let rest = line.trim().strip_prefix("## ")?.trim_start();

    if let Some(after) = rest.strip_prefix(CONFIG_MARKER) {
        let title = after.trim_start_matches(VARIATION_SELECTOR).trim();
        return title
            .eq_ignore_ascii_case(CONFIG_TITLE)
            .then_some(Heading::Configuration);
    }

    COLUMN_MARKERS.iter().find_map(|marker| {
        let after = rest.strip_prefix(marker)?;
        let title_part = after.trim_start_matches(VARIATION_SELECTOR);
        let title = title_part.trim();
        if title.is_empty() {
            return None;
        }
        let marker_len = rest.len() - title_part.len();
        Some(Heading::Column {
            marker: rest[..marker_len].to_string(),
            title: title.to_string(),
        })
    })
}

/// Parse `### TASK-<digits> | <title>` into `(id, title)`
pub fn parse_task_header(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix("###")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix("TASK-")?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let title = rest[digits_end..].trim_start().strip_prefix('|')?;
    Some((format!("TASK-{}", &rest[..digits_end]), title.trim().to_string()))
}

/// Find a column by the title used as the rebuild join key
pub fn find_column_by_title(columns: &[Column], title: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c.title.eq_ignore_ascii_case(title.trim()))
}

/// Parse board text. Never fails: anything unrecognized is left for the
/// rebuilder to pass through untouched.
pub fn parse_board(source: &str) -> Board {
    let mut parser = BoardParser::default();
    let mut line_count = 0;
    for (idx, line) in source.split('\n').enumerate() {
        parser.feed(idx, line);
        line_count = idx + 1;
    }
    parser.finish(line_count, last_issued_id(source))
}

#[derive(Debug)]
struct BoardParser {
    mode: ParseMode,
    columns: Vec<Column>,
    current_column: Option<usize>,
    open_task: Option<(usize, Task)>,
    config: IndexMap<String, String>,
}

impl Default for BoardParser {
    fn default() -> Self {
        BoardParser {
            mode: ParseMode::TopLevel,
            columns: Vec::new(),
            current_column: None,
            open_task: None,
            config: IndexMap::new(),
        }
    }
}

impl BoardParser {
    fn feed(&mut self, idx: usize, line: &str) {
        let kind = classify_line(line, self.mode);
        let next = transition(self.mode, &kind, self.current_column.is_some());

        match &kind {
            LineKind::Heading(Heading::Column { marker, title }) => {
                self.flush_task(idx);
                self.current_column = Some(self.open_column(marker, title));
            }
            LineKind::Heading(Heading::Configuration) => {
                self.flush_task(idx);
                self.current_column = None;
            }
            LineKind::TaskHeader { id, title } if self.mode != ParseMode::Configuration => {
                self.flush_task(idx);
                if self.current_column.is_some() {
                    let mut task = Task::new(id.clone(), title.clone());
                    task.source_text = vec![line.to_string()];
                    self.open_task = Some((idx, task));
                } else {
                    debug!(line = idx + 1, task = %id, "task header outside any column");
                }
            }
            _ => self.feed_content(line, &kind),
        }

        self.mode = next;
    }

    fn feed_content(&mut self, line: &str, kind: &LineKind) {
        if self.mode == ParseMode::Configuration {
            if let Some((key, value)) = parse_config_line(line) {
                self.config.insert(key, value);
            }
            return;
        }

        let in_history = self.mode == ParseMode::InHistory;
        let Some((_, task)) = self.open_task.as_mut() else {
            return;
        };
        task.source_text.push(line.to_string());

        match kind {
            LineKind::HistoryOpen { inline, .. } | LineKind::HistoryClose { inline } => {
                task.history.extend(inline.iter().cloned());
            }
            LineKind::Blank | LineKind::Sentinel => {}
            _ if in_history => task.history.push(line.trim().to_string()),
            LineKind::Field => extract_fields(line, &mut task.metadata),
            _ => task.body_lines.push(line.trim_end().to_string()),
        }
    }

    fn open_column(&mut self, marker: &str, title: &str) -> usize {
        if let Some(idx) = find_column_by_title(&self.columns, title) {
            debug!(column = %title, "repeated column header, merging");
            return idx;
        }
        let mut column = Column::new(marker, title);
        column.from_source = true;
        self.columns.push(column);
        self.columns.len() - 1
    }

    fn flush_task(&mut self, end_idx: usize) {
        if let Some((start, mut task)) = self.open_task.take() {
            task.source_lines = Some(SourceSpan::new(start, end_idx));
            if let Some(col) = self.current_column {
                self.columns[col].tasks.push(task);
            }
        }
    }

    fn finish(mut self, line_count: usize, last_task_id: u32) -> Board {
        self.flush_task(line_count);
        for column in &mut self.columns {
            column.source_spans = column.tasks.iter().map(|t| t.source_text.clone()).collect();
        }
        Board::new(self.columns, self.config, last_task_id)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::FieldKey;

    const BOARD: &str = "\
# Website Relaunch

<!-- Config: Last Task ID: 004 -->

## 📝 To Do

<!-- Drop new ideas here -->

### TASK-001 | Draft landing copy
**Priority**: High | **Assigned**: @maya
**Tags**: copy, web

Needs sign-off from marketing.

### TASK-002 | Pick a font
**Priority**: Low

## 🚀 In Progress

### TASK-003 | Set up CI
**Creator**: @lee | **Estimate**: 3d
<!-- History:
2026-01-02T10:00:00Z | lee | created in To Do
2026-01-03T09:30:00Z | lee | moved from To Do to In Progress
-->

## ✅ Done

## ⚙️ Configuration

**Default Assignee**: @maya
**Archive After**: 30 days
";

    #[test]
    fn test_parse_columns_and_tasks() {
        let board = parse_board(BOARD);
        let titles: Vec<_> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);
        assert_eq!(board.columns[1].id, "in-progress");
        assert_eq!(board.columns[0].tasks.len(), 2);
        assert_eq!(board.columns[1].tasks.len(), 1);
        assert!(board.columns[2].tasks.is_empty());
        assert_eq!(board.last_task_id, 4);
    }

    #[test]
    fn test_parse_task_fields_and_body() {
        let board = parse_board(BOARD);
        let task = board.task("TASK-001").unwrap();
        assert_eq!(task.title, "Draft landing copy");
        assert_eq!(task.field(FieldKey::Priority), Some("High"));
        assert_eq!(task.field(FieldKey::Assigned), Some("@maya"));
        assert_eq!(task.field(FieldKey::Tags), Some("copy, web"));
        assert_eq!(task.body_lines, vec!["Needs sign-off from marketing."]);
        // Header, two field lines, blank, body, blank
        assert_eq!(task.source_text.len(), 6);
        assert_eq!(task.source_lines, Some(SourceSpan::new(8, 14)));
    }

    #[test]
    fn test_unrecognized_field_stays_in_span_only() {
        let board = parse_board(BOARD);
        let task = board.task("TASK-003").unwrap();
        assert_eq!(task.field(FieldKey::Creator), Some("@lee"));
        assert_eq!(task.metadata.len(), 1);
        assert!(task.raw_span().contains("**Estimate**: 3d"));
    }

    #[test]
    fn test_history_block() {
        let board = parse_board(BOARD);
        let task = board.task("TASK-003").unwrap();
        assert_eq!(
            task.history,
            vec![
                "2026-01-02T10:00:00Z | lee | created in To Do",
                "2026-01-03T09:30:00Z | lee | moved from To Do to In Progress",
            ]
        );
        assert!(task.body_lines.is_empty());
    }

    #[test]
    fn test_single_line_history_block() {
        let source = "## 📝 To Do\n### TASK-001 | A\n<!-- History: 2026-01-01 | ann | created -->\ntail";
        let board = parse_board(source);
        let task = board.task("TASK-001").unwrap();
        assert_eq!(task.history, vec!["2026-01-01 | ann | created"]);
        assert_eq!(task.body_lines, vec!["tail"]);
    }

    #[test]
    fn test_configuration_section() {
        let board = parse_board(BOARD);
        assert_eq!(board.config.get("Default Assignee").map(String::as_str), Some("@maya"));
        assert_eq!(board.config.get("Archive After").map(String::as_str), Some("30 days"));
        // Config lines do not leak into the last column
        assert!(board.columns[2].tasks.is_empty());
    }

    #[test]
    fn test_task_before_any_column_is_ignored() {
        let board = parse_board("### TASK-009 | Orphan\n## 📝 To Do\n### TASK-010 | Kept\n");
        assert!(board.task("TASK-009").is_none());
        assert!(board.task("TASK-010").is_some());
    }

    #[test]
    fn test_malformed_input_never_fails() {
        let board = parse_board("## 📝\n### TASK- | nope\n<!-- History:\n### TASK-1 no pipe\n");
        assert!(board.columns.is_empty());
        assert_eq!(board.last_task_id, 0);
    }

    #[test]
    fn test_unclosed_history_ends_at_next_header() {
        let source = "## 📝 To Do\n### TASK-001 | A\n<!-- History:\nentry one\n### TASK-002 | B\nbody";
        let board = parse_board(source);
        assert_eq!(board.task("TASK-001").unwrap().history, vec!["entry one"]);
        assert_eq!(board.task("TASK-002").unwrap().body_lines, vec!["body"]);
    }

    #[test]
    fn test_repeated_column_header_merges() {
        let source = "## ✅ Done\n### TASK-001 | A\n## 📝 To Do\n## ✅ Done\n### TASK-002 | B\n";
        let board = parse_board(source);
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[0].tasks.len(), 2);
    }

    #[test]
    fn test_classify_heading() {
        assert_eq!(
            classify_heading("## ✅ Done"),
            Some(Heading::Column {
                marker: "✅".into(),
                title: "Done".into()
            })
        );
        assert_eq!(
            classify_heading("## ⏸️ On Hold"),
            Some(Heading::Column {
                marker: "⏸\u{FE0F}".into(),
                title: "On Hold".into()
            })
        );
        assert_eq!(classify_heading("## ⚙️ Configuration"), Some(Heading::Configuration));
        assert_eq!(classify_heading("## ⚙ configuration"), Some(Heading::Configuration));
        assert_eq!(classify_heading("## Notes"), None);
        assert_eq!(classify_heading("### ✅ Done"), None);
    }

    #[test]
    fn test_parse_task_header() {
        assert_eq!(
            parse_task_header("### TASK-042 | Ship it"),
            Some(("TASK-042".into(), "Ship it".into()))
        );
        assert_eq!(
            parse_task_header("###   TASK-7|Tight"),
            Some(("TASK-7".into(), "Tight".into()))
        );
        assert_eq!(parse_task_header("#### TASK-001 | Too deep"), None);
        assert_eq!(parse_task_header("### TASK-abc | Bad"), None);
        assert_eq!(parse_task_header("### TASK-001 Missing pipe"), None);
    }

    #[test]
    fn test_transitions() {
        let column = LineKind::Heading(Heading::Column {
            marker: "📝".into(),
            title: "To Do".into(),
        });
        let task = LineKind::TaskHeader {
            id: "TASK-001".into(),
            title: "A".into(),
        };
        let open = LineKind::HistoryOpen {
            inline: None,
            closed: false,
        };
        let close = LineKind::HistoryClose { inline: None };

        assert_eq!(transition(ParseMode::InHistory, &column, true), ParseMode::TopLevel);
        assert_eq!(transition(ParseMode::TopLevel, &task, true), ParseMode::InTask);
        assert_eq!(transition(ParseMode::TopLevel, &task, false), ParseMode::TopLevel);
        assert_eq!(
            transition(ParseMode::Configuration, &task, true),
            ParseMode::Configuration
        );
        assert_eq!(transition(ParseMode::InTask, &open, true), ParseMode::InHistory);
        assert_eq!(transition(ParseMode::TopLevel, &open, true), ParseMode::TopLevel);
        assert_eq!(transition(ParseMode::InHistory, &close, true), ParseMode::InTask);
        assert_eq!(
            transition(ParseMode::TopLevel, &LineKind::Heading(Heading::Configuration), false),
            ParseMode::Configuration
        );
    }
}
