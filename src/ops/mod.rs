pub mod display;
pub mod history;
pub mod id_alloc;
pub mod task_ops;

pub use display::{normalize_id, serialize_for_display};
pub use id_alloc::{next_id, stamp_id};
pub use task_ops::TaskError;
