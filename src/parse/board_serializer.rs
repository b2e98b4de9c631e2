use std::collections::HashSet;

use crate::model::board::{Board, Column};
use crate::ops::id_alloc::stamp_id;
use crate::parse::board_parser::{Heading, classify_heading, find_column_by_title, parse_task_header};

/// Re-emit `original` with the bodies of changed columns replaced by the
/// board's current tasks. Everything else is copied line for line:
/// narrative text, the configuration section, columns the board does not
/// know, and columns whose tasks are unchanged since parsing.
///
/// Columns in the board with no header in `original` are appended at the
/// end. If the sequence moved, the id sentinel is stamped. Lines the rebuild
/// writes itself follow the document's line ending.
pub fn rebuild(board: &Board, original: &str) -> String {
    let lines: Vec<&str> = original.split('\n').collect();
    let crlf = uses_crlf(original);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut matched: HashSet<usize> = HashSet::new();
    let mut regenerated: HashSet<usize> = HashSet::new();
    let mut rewrote_tail = false;

    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        out.push(line.to_string());
        idx += 1;

        let Some(Heading::Column { title, .. }) = classify_heading(line) else {
            continue;
        };
        let Some(ci) = find_column_by_title(&board.columns, &title) else {
            continue;
        };
        matched.insert(ci);
        let column = &board.columns[ci];
        if !column.is_modified() {
            continue;
        }

        let body_end = lines[idx..]
            .iter()
            .position(|l| classify_heading(l).is_some())
            .map_or(lines.len(), |p| idx + p);
        if regenerated.insert(ci) {
            emit_column_body(column, &lines[idx..body_end], crlf, &mut out);
        }
        idx = body_end;
        rewrote_tail = idx == lines.len();
    }

    // The last separator of a body rewritten at the end of the file is the
    // file's final line break
    if rewrote_tail {
        match out.last().map(|l| l.trim().is_empty()) {
            Some(true) => {
                if let Some(last) = out.last_mut() {
                    last.clear();
                }
            }
            Some(false) if lines.last() == Some(&"") => out.push(String::new()),
            _ => {}
        }
    }

    let pending: Vec<&Column> = board
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !matched.contains(i))
        .map(|(_, c)| c)
        .collect();
    if !pending.is_empty() {
        append_columns(&pending, crlf, &mut out);
    }

    let text = out.join("\n");
    if board.sequence_advanced() {
        stamp_id(&text, board.last_task_id)
    } else {
        text
    }
}

/// Whether most line breaks in `text` are `\r\n`
pub fn uses_crlf(text: &str) -> bool {
    let breaks = text.matches('\n').count();
    breaks > 0 && text.matches("\r\n").count() * 2 > breaks
}

/// Push a line the rebuild produced, terminated like the document's lines
fn push_line(out: &mut Vec<String>, line: &str, crlf: bool) {
    if crlf && !line.ends_with('\r') {
        out.push(format!("{}\r", line));
    } else {
        out.push(line.to_string());
    }
}

/// Emit a regenerated column body: a blank line, the non-task lines that
/// sat above the first task (e.g. a hint comment), then every task's span
/// followed by a blank separator.
fn emit_column_body(column: &Column, old_body: &[&str], crlf: bool, out: &mut Vec<String>) {
    let first_task = old_body
        .iter()
        .position(|l| parse_task_header(l).is_some())
        .unwrap_or(old_body.len());
    let preamble = &old_body[..first_task];

    push_line(out, "", crlf);
    if let (Some(start), Some(end)) = (
        preamble.iter().position(|l| !l.trim().is_empty()),
        preamble.iter().rposition(|l| !l.trim().is_empty()),
    ) {
        for line in &preamble[start..=end] {
            push_line(out, line, crlf);
        }
        push_line(out, "", crlf);
    }
    emit_tasks(column, crlf, out);
}

fn emit_tasks(column: &Column, crlf: bool, out: &mut Vec<String>) {
    for task in &column.tasks {
        for line in task.trimmed_span() {
            push_line(out, line, crlf);
        }
        push_line(out, "", crlf);
    }
}

fn append_columns(columns: &[&Column], crlf: bool, out: &mut Vec<String>) {
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    for column in columns {
        if !out.is_empty() {
            push_line(out, "", crlf);
        }
        push_line(out, &column.header_line(), crlf);
        push_line(out, "", crlf);
        emit_tasks(column, crlf, out);
        while out.last().is_some_and(|l| l.trim().is_empty()) {
            out.pop();
        }
    }
    out.push(String::new());
}
