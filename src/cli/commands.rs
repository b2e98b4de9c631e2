use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mdb", about = concat!("mdboard v", env!("CARGO_PKG_VERSION"), " - a kanban board that is just markdown"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Board file to operate on
    #[arg(short = 'f', long = "file", global = true, env = "MDBOARD_FILE", default_value = "board.md")]
    pub file: String,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Name recorded in task history (default: config, then $USER)
    #[arg(long, global = true, env = "MDBOARD_ACTOR")]
    pub actor: Option<String>,

    /// Display-id prefix, overriding project_prefix from mdboard.toml
    #[arg(long, global = true)]
    pub prefix: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the board, one column, or one task
    Show(ShowArgs),
    /// Create a task in a column
    Add(AddArgs),
    /// Move a task to a column (or reorder within one)
    Mv(MvArgs),
    /// Change a task's title, fields or body
    Update(UpdateArgs),
    /// Delete a task (its text is kept in the recovery log)
    Rm(RmArgs),
    /// Print the id the next created task would get
    NextId,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ShowArgs {
    /// Task to show (internal or display id); omit for the whole board
    pub id: Option<String>,
    /// Only show this column
    #[arg(long, conflicts_with = "id")]
    pub column: Option<String>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Column title (or slug) to add the task to
    pub column: String,
    /// Task title
    pub title: String,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub assigned: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub tags: Option<String>,
    /// Body text (repeat for several lines)
    #[arg(long, action = clap::ArgAction::Append)]
    pub body: Vec<String>,
    /// Insert at the top of the column instead of the bottom
    #[arg(long, conflicts_with = "after")]
    pub top: bool,
    /// Insert after this task
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args)]
pub struct MvArgs {
    /// Task to move
    pub id: String,
    /// Target column title (or slug)
    pub column: String,
    /// Place at the top of the column
    #[arg(long, conflicts_with_all = ["after", "position"])]
    pub top: bool,
    /// Place right after this task
    #[arg(long, conflicts_with = "position")]
    pub after: Option<String>,
    /// Zero-based slot in the target column
    #[arg(long)]
    pub position: Option<usize>,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Task to update
    pub id: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// Set a field: --set priority=High (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub set: Vec<String>,
    /// Remove a field (repeatable)
    #[arg(long = "unset", value_name = "KEY", action = clap::ArgAction::Append)]
    pub unset: Vec<String>,
    /// Replace the body (repeat for several lines)
    #[arg(long, action = clap::ArgAction::Append)]
    pub body: Vec<String>,
    /// Remove the body
    #[arg(long, conflicts_with = "body")]
    pub clear_body: bool,
}

#[derive(Args)]
pub struct RmArgs {
    /// Task to delete
    pub id: String,
}
