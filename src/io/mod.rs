pub mod board_io;
pub mod lock;
pub mod recovery;

pub use board_io::{BoardStore, Committed, StoreError};
pub use lock::{DocumentLocks, LockError};
