//! Fixed-size worker pool draining a shared FIFO of tasks.
//!
//! # Sub-modules
//!
//! - **`queue`** – [`TaskQueue`], an unbounded FIFO guarded by a mutex and a
//!   "not empty" condition variable.  It also carries the pool's shutdown
//!   flag, so a worker checks for shutdown and takes the next task under the
//!   same lock.
//!
//! - **`pool`** – [`WorkerPool`], which owns the worker threads and joins them
//!   on teardown, and the [`TaskHandler`] trait through which tasks run.
//!
//! - **`task`** – The relay's concrete [`Task`] variants (receive / send).
//!
//! # Threading model (for beginners)
//!
//! ```text
//!  multiplexer ──enqueue──►┌───────────┐
//!  worker (fan-out) ──────►│ TaskQueue │──dequeue──► worker 0..N ──► TaskHandler
//!                          └───────────┘
//! ```
//!
//! Workers hold the queue lock only while taking a task.  The task itself
//! (socket reads and writes included) always runs with the lock released.

pub mod pool;
pub mod queue;
pub mod task;

pub use pool::{PoolError, TaskHandler, WorkerPool};
pub use queue::TaskQueue;
pub use task::Task;
