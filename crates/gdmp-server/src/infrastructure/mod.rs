//! Infrastructure layer for the relay server.
//!
//! Contains the OS-facing adapters: sockets and readiness polling, the worker
//! threads that execute relay tasks, and file-system configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `gdmp_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
pub mod worker_pool;
