//! Application layer: relay decisions with no I/O.
//!
//! Use cases in this layer:
//!
//! - **Decide** what a decoded message means for the relay (broadcast it,
//!   acknowledge a join, or discard it) without touching sockets.
//! - **Contain no OS calls, no network I/O, no file system access**, so every
//!   rule can be unit-tested with plain values.
//!
//! # Sub-modules
//!
//! - **`route_message`** – Maps a decoded [`gdmp_core::Message`] to a
//!   [`route_message::Route`].  The infrastructure dispatcher acts on the
//!   route: fan-out for text, a log line for joins, a warning for discards.

pub mod route_message;
