use std::path::PathBuf;

use serde::Serialize;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::board_io::BoardStore;
use crate::model::task::FieldKey;
use crate::ops::display::{TaskView, display_id, normalize_id, serialize_for_display};
use crate::ops::id_alloc::format_task_id;
use crate::ops::task_ops::{InsertPosition, NewTask, TaskUpdate};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a command needs besides its own args
struct Context {
    path: PathBuf,
    store: BoardStore,
    actor: String,
    json: bool,
}

impl Context {
    fn prefix(&self) -> Option<&str> {
        self.store.config().project_prefix.as_deref()
    }

    fn display(&self, internal: &str) -> String {
        display_id(internal, self.prefix())
    }
}

#[derive(Serialize)]
struct TaskIdJson {
    id: String,
    internal_id: String,
}

#[derive(Serialize)]
struct TaskDetailJson<'a> {
    column: &'a str,
    #[serde(flatten)]
    task: &'a TaskView,
}

#[derive(Serialize)]
struct UpdatedJson {
    id: String,
    changed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let path = PathBuf::from(&cli.file);
    let mut store = BoardStore::for_board(&path)?;
    if let Some(prefix) = cli.prefix {
        store.config_mut().project_prefix = Some(prefix);
    }
    let actor = cli
        .actor
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| store.config().default_actor());
    let ctx = Context {
        path,
        store,
        actor,
        json: cli.json,
    };

    match cli.command {
        // Read commands
        Commands::Show(args) => cmd_show(&ctx, args),
        Commands::NextId => cmd_next_id(&ctx),

        // Write commands
        Commands::Add(args) => cmd_add(&ctx, args),
        Commands::Mv(args) => cmd_mv(&ctx, args),
        Commands::Update(args) => cmd_update(&ctx, args),
        Commands::Rm(args) => cmd_rm(&ctx, args),
    }
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_show(ctx: &Context, args: ShowArgs) -> CmdResult {
    let (board, _) = ctx.store.load_and_parse(&ctx.path)?;
    let mut view = serialize_for_display(&board, ctx.prefix());

    if let Some(ref id) = args.id {
        let internal = normalize_id(id).ok_or_else(|| format!("not a task id: {}", id))?;
        let internal = board.canonical_id(&internal).unwrap_or(internal.as_str()).to_string();
        let (column, task) = view
            .columns
            .iter()
            .find_map(|c| {
                c.tasks
                    .iter()
                    .find(|t| t.internal_id == internal)
                    .map(|t| (c.title.as_str(), t))
            })
            .ok_or_else(|| format!("task not found: {}", id))?;
        if ctx.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&TaskDetailJson { column, task })?
            );
        } else {
            for line in format_task_detail(task, column) {
                println!("{}", line);
            }
        }
        return Ok(());
    }

    if let Some(ref column) = args.column {
        let idx = board
            .column_index(column)
            .ok_or_else(|| format!("column not found: {}", column))?;
        let kept = view.columns.swap_remove(idx);
        view.columns = vec![kept];
    }

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        for line in format_board(&view) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_next_id(ctx: &Context) -> CmdResult {
    let (mut board, _) = ctx.store.load_and_parse(&ctx.path)?;
    let internal = format_task_id(board.allocate_id());
    print_id(ctx, &internal)
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_add(ctx: &Context, args: AddArgs) -> CmdResult {
    let fields: Vec<(FieldKey, String)> = [
        (FieldKey::Priority, args.priority),
        (FieldKey::Project, args.project),
        (FieldKey::Assigned, args.assigned),
        (FieldKey::Tags, args.tags),
    ]
    .into_iter()
    .filter_map(|(k, v)| Some((k, v?.trim().to_string())))
    .filter(|(_, v)| !v.is_empty())
    .collect();

    let title = args.title.trim().to_string();
    if title.is_empty() {
        return Err("task title cannot be empty".into());
    }

    let position = if args.top {
        InsertPosition::Top
    } else if let Some(ref after) = args.after {
        InsertPosition::After(resolve_id(after)?)
    } else {
        InsertPosition::Bottom
    };

    let new = NewTask {
        title,
        fields,
        body: args.body,
    };
    let id = ctx
        .store
        .create_task(&ctx.path, &args.column, new, position, &ctx.actor)?;
    print_id(ctx, &id)
}

fn cmd_mv(ctx: &Context, args: MvArgs) -> CmdResult {
    let position = if args.top {
        InsertPosition::Top
    } else if let Some(ref after) = args.after {
        InsertPosition::After(resolve_id(after)?)
    } else if let Some(n) = args.position {
        InsertPosition::Index(n)
    } else {
        InsertPosition::Bottom
    };

    let id = resolve_id(&args.id)?;
    let moved = ctx
        .store
        .move_task(&ctx.path, &id, &args.column, position, &ctx.actor)?;
    print_id(ctx, &moved)
}

fn cmd_update(ctx: &Context, args: UpdateArgs) -> CmdResult {
    let mut update = TaskUpdate {
        title: args.title,
        ..Default::default()
    };
    for pair in &args.set {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", pair))?;
        update.fields.push((parse_field_key(key)?, Some(value.to_string())));
    }
    for key in &args.unset {
        update.fields.push((parse_field_key(key)?, None));
    }
    if args.clear_body {
        update.body = Some(Vec::new());
    } else if !args.body.is_empty() {
        update.body = Some(args.body);
    }
    if update.is_empty() {
        return Err("nothing to update (use --title, --set, --unset, --body or --clear-body)".into());
    }

    let id = resolve_id(&args.id)?;
    let changed = ctx.store.update_task(&ctx.path, &id, update, &ctx.actor)?;

    if ctx.json {
        let out = UpdatedJson {
            id: ctx.display(&id),
            changed,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if changed.is_empty() {
        println!("{}: no changes", ctx.display(&id));
    } else {
        println!("{}: updated {}", ctx.display(&id), changed.join(", "));
    }
    Ok(())
}

fn cmd_rm(ctx: &Context, args: RmArgs) -> CmdResult {
    let id = resolve_id(&args.id)?;
    let task = ctx.store.delete_task(&ctx.path, &id)?;
    if ctx.json {
        print_id(ctx, &task.id)
    } else {
        println!("deleted {} {}", ctx.display(&task.id), task.title);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_id(input: &str) -> Result<String, String> {
    normalize_id(input).ok_or_else(|| format!("not a task id: {}", input))
}

fn parse_field_key(key: &str) -> Result<FieldKey, String> {
    FieldKey::from_label(key).ok_or_else(|| {
        let known: Vec<String> = FieldKey::ALL.iter().map(|k| k.to_string()).collect();
        format!(
            "unknown field '{}' (expected: {})",
            key.trim(),
            known.join(", ")
        )
    })
}

fn print_id(ctx: &Context, internal: &str) -> CmdResult {
    if ctx.json {
        let out = TaskIdJson {
            id: ctx.display(internal),
            internal_id: internal.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", ctx.display(internal));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_key() {
        assert_eq!(parse_field_key("priority").unwrap(), FieldKey::Priority);
        assert_eq!(parse_field_key(" Assigned ").unwrap(), FieldKey::Assigned);
        let err = parse_field_key("owner").unwrap_err();
        assert!(err.contains("unknown field 'owner'"));
        assert!(err.contains("priority, project"));
    }

    #[test]
    fn test_resolve_id() {
        assert_eq!(resolve_id("acme-7").unwrap(), "TASK-007");
        assert!(resolve_id("seven").is_err());
    }
}
