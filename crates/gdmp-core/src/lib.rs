//! # gdmp-core
//!
//! Shared library for the GDMP chat relay containing the message model and
//! the line-oriented text codec.
//!
//! It has no dependencies on sockets, threads, or the terminal, so both the
//! server and any client can link it.
//!
//! # Protocol overview (for beginners)
//!
//! GDMP is a plain-text protocol.  Each message starts with a type name on its
//! own line, followed by one `Header: Value` line per field:
//!
//! ```text
//! GDMP_TEXT_MESSAGE
//! Username: Will
//! Content: G'day mate!
//! Timestamp: 12:34
//! ```
//!
//! - **`protocol::messages`** – The [`Message`] type, the three
//!   [`MessageType`]s, and the header schema of each type (which headers are
//!   required, and in which order they are written).
//!
//! - **`protocol::codec`** – [`encode_message`] / [`decode_message`] and
//!   [`validate`].  Decoding is total: malformed input becomes a
//!   `GDMP_ERROR_MESSAGE` rather than an error, so a misbehaving peer can never
//!   crash the decoder.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `gdmp_core::Message` instead of `gdmp_core::protocol::messages::Message`.
pub use protocol::codec::{decode_bytes, decode_message, encode_message, validate, ProtocolError};
pub use protocol::messages::{Message, MessageType, MESSAGE_MAX_LEN};
