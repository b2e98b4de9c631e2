use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Poll interval while waiting on another process's flock
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drop dead registry entries once the map grows past this
const CLEANUP_THRESHOLD: usize = 64;

static GLOBAL_LOCKS: LazyLock<DocumentLocks> = LazyLock::new(DocumentLocks::new);

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("timed out waiting for the lock on {path}: another writer is busy, try again")]
    Timeout { path: PathBuf },
    #[error("lock error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Serializes read-modify-write cycles per document.
///
/// Within the process each canonical path maps to its own mutex, so writers
/// to different boards never wait on each other. Across processes the
/// holder also takes an advisory `flock` on a lock file beside the board.
pub struct DocumentLocks {
    locks: Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>,
}

impl Default for DocumentLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLocks {
    pub fn new() -> Self {
        DocumentLocks {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static DocumentLocks {
        &GLOBAL_LOCKS
    }

    /// Run `op` while holding the lock for `path`. Waits at most `timeout`
    /// in total before giving up with `LockError::Timeout`.
    pub fn with_lock<T, E, F>(&self, path: &Path, timeout: Duration, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        let key = canonical_key(path);
        let start = Instant::now();
        let mutex = self.entry(&key);

        let Some(_guard) = mutex.try_lock_for(timeout) else {
            warn!(path = %key.display(), ?timeout, "document lock timed out");
            return Err(LockError::Timeout { path: key }.into());
        };
        let remaining = timeout.saturating_sub(start.elapsed());
        let _file_lock = FileLock::acquire(&lock_file_path(&key), remaining)?;
        debug!(path = %key.display(), waited = ?start.elapsed(), "document lock acquired");

        op()
    }

    fn entry(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock();
        if let Some(existing) = map.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        if map.len() > CLEANUP_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }
        let mutex = Arc::new(Mutex::new(()));
        map.insert(key.to_path_buf(), Arc::downgrade(&mutex));
        mutex
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Resolve symlinks and `..` so that every spelling of a path shares a lock.
/// The file itself may not exist yet.
pub fn canonical_key(path: &Path) -> PathBuf {
    if let Ok(p) = std::fs::canonicalize(path) {
        return p;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (std::fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// `dir/board.md` → `dir/.board.md.lock`
pub fn lock_file_path(board_path: &Path) -> PathBuf {
    let name = board_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "board".to_string());
    board_path.with_file_name(format!(".{}.lock", name))
}

/// Advisory file lock shared with other processes writing the same board.
///
/// Uses platform-native flock (Unix). The lock file is left in place so
/// that every process always locks the same inode.
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Acquire the lock on `lock_path`, polling until `timeout` elapses.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| LockError::CreateError {
                path: lock_path.to_path_buf(),
                source: e,
            })?;

        let start = Instant::now();
        loop {
            match try_lock(&file) {
                Ok(()) => return Ok(FileLock { _file: file }),
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(_) => {
                    return Err(LockError::Timeout {
                        path: lock_path.to_path_buf(),
                    });
                }
            }
        }
    }
}

/// Try to acquire an exclusive flock on the file (non-blocking)
#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    // Only the in-process mutex applies here
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release_file_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".board.md.lock");

        let lock = FileLock::acquire(&path, Duration::from_secs(1));
        assert!(lock.is_ok());
        drop(lock);

        let lock2 = FileLock::acquire(&path, Duration::from_secs(1));
        assert!(lock2.is_ok());
    }

    #[test]
    fn test_file_lock_contention() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".board.md.lock");
        let _lock1 = FileLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let lock2 = FileLock::acquire(&path, Duration::from_millis(50));
        assert!(matches!(lock2, Err(LockError::Timeout { .. })));
    }

    #[test]
    fn test_lock_file_path() {
        assert_eq!(
            lock_file_path(Path::new("/tmp/x/board.md")),
            PathBuf::from("/tmp/x/.board.md.lock")
        );
    }

    #[test]
    fn test_canonical_key_unifies_spellings() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let direct = tmp.path().join("board.md");
        let roundabout = tmp.path().join("sub/../board.md");
        assert_eq!(canonical_key(&direct), canonical_key(&roundabout));
    }

    #[test]
    fn test_same_path_times_out_while_held() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("board.md");
        let locks = Arc::new(DocumentLocks::new());
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let locks = Arc::clone(&locks);
            let path = path.clone();
            std::thread::spawn(move || {
                locks.with_lock(&path, Duration::from_secs(5), || {
                    held_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok::<_, LockError>(())
                })
            })
        };

        held_rx.recv().unwrap();
        let second = locks.with_lock(&path, Duration::from_millis(50), || Ok::<_, LockError>(()));
        assert!(matches!(second, Err(LockError::Timeout { .. })));

        release_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();
        let third = locks.with_lock(&path, Duration::from_secs(1), || Ok::<_, LockError>(3));
        assert_eq!(third.unwrap(), 3);
    }

    #[test]
    fn test_different_paths_do_not_block() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.md");
        let b = tmp.path().join("b.md");
        let locks = DocumentLocks::new();

        let inner = locks.with_lock(&a, Duration::from_secs(1), || {
            locks.with_lock(&b, Duration::from_millis(50), || Ok::<_, LockError>("b done"))
        });
        assert_eq!(inner.unwrap(), "b done");
    }

    #[test]
    fn test_critical_sections_do_not_overlap() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("board.md");
        let locks = Arc::new(DocumentLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (locks, path) = (Arc::clone(&locks), path.clone());
                let (inside, max_inside) = (Arc::clone(&inside), Arc::clone(&max_inside));
                std::thread::spawn(move || {
                    locks
                        .with_lock(&path, Duration::from_secs(10), || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(5));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, LockError>(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_entries_are_released() {
        let tmp = TempDir::new().unwrap();
        let locks = DocumentLocks::new();
        for i in 0..(CLEANUP_THRESHOLD + 10) {
            let path = tmp.path().join(format!("{}.md", i));
            locks
                .with_lock(&path, Duration::from_secs(1), || Ok::<_, LockError>(()))
                .unwrap();
        }
        assert!(locks.len() <= CLEANUP_THRESHOLD + 1);
    }
}
