//! Network infrastructure for the relay server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Creates the non-blocking listening socket with
//!   `SO_REUSEADDR` and the configured backlog.
//!
//! - **`poll_set`** – Bounded bookkeeping of the descriptors currently watched
//!   for readability.
//!
//! - **`registry`** – Owns every accepted connection, its lifecycle state
//!   (pollable / in-flight / closed) and its poller registration.
//!
//! - **`dispatch`** – Executes receive and send tasks on the worker threads:
//!   reads, decodes, routes and fans out messages.
//!
//! - **`server`** – The multiplexer loop that accepts clients and turns
//!   readiness events into receive tasks, plus the handle used to stop it.
//!
//! # Threading model (for beginners)
//!
//! ```text
//!                 ┌──────────────┐  Task::Receive   ┌──────────────┐
//!  sockets ──────►│ multiplexer  │ ───────────────► │ worker pool  │
//!   (epoll)       │  (1 thread)  │                  │ (N threads)  │
//!                 └──────┬───────┘                  └──────┬───────┘
//!                        │ admit / deregister              │ re-register / remove
//!                        ▼                                 ▼
//!                 ┌──────────────────────────────────────────────────┐
//!                 │           ConnectionRegistry (Mutex)             │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! The multiplexer never reads or writes client data; workers never call
//! `poll`.  A readable socket leaves the poll set before its receive task is
//! queued and returns only when that task is done with it.

pub mod dispatch;
pub mod listener;
pub mod poll_set;
pub mod registry;
pub mod server;

pub use dispatch::{Dispatcher, ReceiveOutcome, SendOutcome};
pub use listener::bind_listener;
pub use registry::{Connection, ConnectionId, ConnectionRegistry, ConnectionState, RegistryError};
pub use server::{Server, ServerError, ServerHandle};
