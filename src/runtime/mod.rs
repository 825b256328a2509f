//! Concurrency primitives shared by the script thread and its producers.
//!
//! The script runtime is single-threaded. Other threads reach it only through
//! the [`TaskQueue`], the [`CancelToken`], or the [`Watchdog`]'s channels.

mod cancel;
pub mod task_queue;
pub mod watchdog;

pub use cancel::{CancelReason, CancelToken};
pub use task_queue::{Task, TaskQueue, TASK_QUEUE_CAPACITY};
pub use watchdog::Watchdog;
