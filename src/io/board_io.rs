use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::io::lock::{DocumentLocks, LockError};
use crate::io::recovery::{atomic_write, log_task_deletion, log_write_failure};
use crate::model::board::Board;
use crate::model::config::{ConfigError, EngineConfig};
use crate::model::task::Task;
use crate::ops::display::normalize_id;
use crate::ops::task_ops::{self, InsertPosition, NewTask, TaskError, TaskUpdate};
use crate::parse::{parse_board, rebuild};

/// Error type for board storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Lock timeouts can be retried by the caller; nothing else can
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Lock(LockError::Timeout { .. }))
    }
}

/// Result of a committed read-modify-write cycle
#[derive(Debug)]
pub struct Committed<T> {
    /// Whatever the mutation returned
    pub value: T,
    /// The board as mutated
    pub board: Board,
    /// Text now on disk
    pub text: String,
    /// False when the rebuilt text equalled the old text and no write happened
    pub written: bool,
}

/// Loads boards and runs guarded mutations against them.
pub struct BoardStore {
    config: EngineConfig,
    locks: &'static DocumentLocks,
}

impl BoardStore {
    pub fn new(config: EngineConfig) -> Self {
        BoardStore {
            config,
            locks: DocumentLocks::global(),
        }
    }

    /// Store configured from the `mdboard.toml` beside `board_path`
    pub fn for_board(board_path: &Path) -> Result<Self, StoreError> {
        let dir = match board_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        Ok(BoardStore::new(EngineConfig::load_from_dir(dir)?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// Read and parse a snapshot of the board. Takes no lock.
    pub fn load_and_parse(&self, path: &Path) -> Result<(Board, String), StoreError> {
        let text = read_text(path)?;
        Ok((parse_board(&text), text))
    }

    /// Parse, apply `mutate`, rebuild and write the board, all while
    /// holding the document lock. If `mutate` fails nothing is written.
    pub fn mutate_under_lock<T, F>(&self, path: &Path, mutate: F) -> Result<Committed<T>, StoreError>
    where
        F: FnOnce(&mut Board, &str) -> Result<T, TaskError>,
    {
        self.locks
            .with_lock(path, self.config.lock_timeout(), || -> Result<Committed<T>, StoreError> {
                let original = read_text(path)?;
                let mut board = parse_board(&original);
                let value = mutate(&mut board, &original)?;
                let text = rebuild(&board, &original);

                if text == original {
                    debug!(path = %path.display(), "board unchanged, skipping write");
                    return Ok(Committed {
                        value,
                        board,
                        text,
                        written: false,
                    });
                }
                if let Err(e) = atomic_write(path, text.as_bytes()) {
                    log_write_failure(path, &e, &text);
                    return Err(StoreError::Write {
                        path: path.to_path_buf(),
                        source: e,
                    });
                }
                debug!(path = %path.display(), bytes = text.len(), "board written");
                Ok(Committed {
                    value,
                    board,
                    text,
                    written: true,
                })
            })
    }

    // -----------------------------------------------------------------------
    // Convenience wrappers
    // -----------------------------------------------------------------------

    /// Create a task and return its internal id
    pub fn create_task(
        &self,
        path: &Path,
        column: &str,
        new: NewTask,
        position: InsertPosition,
        actor: &str,
    ) -> Result<String, StoreError> {
        let committed = self.mutate_under_lock(path, |board, _| {
            task_ops::create_task(board, column, new, position, actor)
        })?;
        Ok(committed.value)
    }

    /// Move a task and return its id as written in the board
    pub fn move_task(
        &self,
        path: &Path,
        task_id: &str,
        column: &str,
        position: InsertPosition,
        actor: &str,
    ) -> Result<String, StoreError> {
        let id = resolve_id(task_id);
        let position = match position {
            InsertPosition::After(anchor) => InsertPosition::After(resolve_id(&anchor)),
            other => other,
        };
        let committed = self.mutate_under_lock(path, |board, _| {
            task_ops::move_task(board, &id, column, position, actor, &self.config)
        })?;
        Ok(committed.value)
    }

    /// Update a task; returns the names of the parts that changed
    pub fn update_task(
        &self,
        path: &Path,
        task_id: &str,
        update: TaskUpdate,
        actor: &str,
    ) -> Result<Vec<String>, StoreError> {
        let id = resolve_id(task_id);
        let committed = self.mutate_under_lock(path, |board, _| {
            task_ops::update_task(board, &id, update, actor)
        })?;
        Ok(committed.value)
    }

    /// Delete a task. Its span is kept in the recovery log.
    pub fn delete_task(&self, path: &Path, task_id: &str) -> Result<Task, StoreError> {
        let id = resolve_id(task_id);
        let committed = self.mutate_under_lock(path, |board, _| {
            let column = board
                .locate(&id)
                .map(|loc| board.columns[loc.column].title.clone())
                .unwrap_or_default();
            task_ops::delete_task(board, &id).map(|task| (task, column))
        })?;
        let (task, column) = committed.value;
        log_task_deletion(path, &task.id, &column, &task.raw_span());
        info!(task = %task.id, column = %column, "deleted task");
        Ok(task)
    }
}

/// Internal id for any accepted spelling; unknown shapes are passed on
/// unchanged so the lookup reports them as not found. Zero padding is
/// settled against the board by `Board::locate`.
fn resolve_id(input: &str) -> String {
    normalize_id(input).unwrap_or_else(|| input.trim().to_string())
}

fn read_text(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|e| StoreError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}
