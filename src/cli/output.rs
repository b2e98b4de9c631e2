use crate::model::task::FieldKey;
use crate::ops::display::{BoardView, ColumnView, TaskView};

/// Format a task as a single listing line
pub fn format_task_line(task: &TaskView) -> String {
    let mut line = format!("{} {}", task.id, task.title);
    if let Some(p) = task.metadata.get(&FieldKey::Priority) {
        line.push_str(&format!(" [{}]", p));
    }
    if let Some(a) = task.metadata.get(&FieldKey::Assigned) {
        line.push_str(&format!(" @{}", a.trim_start_matches('@')));
    }
    if let Some(tags) = task.metadata.get(&FieldKey::Tags) {
        for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            line.push_str(&format!(" #{}", tag.trim_start_matches('#')));
        }
    }
    line
}

/// Format a column header and its tasks
pub fn format_column(column: &ColumnView) -> Vec<String> {
    let mut lines = vec![format!(
        "== {} ({}) [{}] ==",
        column.title,
        column.id,
        column.tasks.len()
    )];
    for task in &column.tasks {
        lines.push(format!("  {}", format_task_line(task)));
    }
    lines
}

/// Format every column, separated by blank lines
pub fn format_board(view: &BoardView) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, column) in view.columns.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.extend(format_column(column));
    }
    lines
}

/// Format detailed task view
pub fn format_task_detail(task: &TaskView, column: &str) -> Vec<String> {
    let mut lines = vec![format!("{} {}", task.id, task.title)];
    lines.push(format!("column: {}", column));
    if let Some(n) = task.line {
        lines.push(format!("line: {}", n));
    }
    for (key, value) in &task.metadata {
        lines.push(format!("{}: {}", key, value));
    }
    if !task.body.is_empty() {
        lines.push(String::new());
        lines.extend(task.body.iter().map(|l| format!("  {}", l)));
    }
    if !task.history.is_empty() {
        lines.push(String::new());
        lines.push("history:".to_string());
        lines.extend(task.history.iter().map(|h| format!("  {}", h)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::display::serialize_for_display;
    use crate::parse::parse_board;

    const BOARD: &str = "\
## 📝 To Do

### TASK-007 | Ship it
**Priority**: High | **Assigned**: bob
**Tags**: release, #web
Cut the tag.
<!-- History:
2026-01-02T03:04:05Z | ana | created in To Do
-->

### TASK-008 | Plan

## ✅ Done
";

    #[test]
    fn test_format_task_line() {
        let view = serialize_for_display(&parse_board(BOARD), None);
        assert_eq!(
            format_task_line(&view.columns[0].tasks[0]),
            "TASK-007 Ship it [High] @bob #release #web"
        );
        assert_eq!(format_task_line(&view.columns[0].tasks[1]), "TASK-008 Plan");
    }

    #[test]
    fn test_format_task_line_assignee_with_at_sign() {
        let board = parse_board("## 📝 To Do\n### TASK-001 | Fix\n**Assigned**: @maya\n");
        let view = serialize_for_display(&board, None);
        assert_eq!(format_task_line(&view.columns[0].tasks[0]), "TASK-001 Fix @maya");
    }

    #[test]
    fn test_format_board() {
        let view = serialize_for_display(&parse_board(BOARD), Some("acme"));
        insta::assert_snapshot!(format_board(&view).join("\n"), @r"
        == To Do (to-do) [2] ==
          ACME-007 Ship it [High] @bob #release #web
          ACME-008 Plan

        == Done (done) [0] ==
        ");
    }

    #[test]
    fn test_format_task_detail() {
        let view = serialize_for_display(&parse_board(BOARD), Some("acme"));
        let lines = format_task_detail(&view.columns[0].tasks[0], "To Do");
        assert_eq!(
            lines,
            vec![
                "ACME-007 Ship it",
                "column: To Do",
                "line: 3",
                "priority: High",
                "assigned: bob",
                "tags: release, #web",
                "",
                "  Cut the tag.",
                "",
                "history:",
                "  2026-01-02T03:04:05Z | ana | created in To Do",
            ]
        );
    }
}
