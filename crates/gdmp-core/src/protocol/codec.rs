//! Text codec for GDMP messages.
//!
//! Wire format:
//! ```text
//! <TYPE_NAME>\n
//! <Header1>: <Value1>\n
//! <Header2>: <Value2>\n
//! ```
//! The whole message is bounded by [`MESSAGE_MAX_LEN`]. There is no length
//! prefix: the transport is expected to deliver one message per read.

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::messages::{
    Message, MessageType, HEADERS_MAX_COUNT, HEADER_SEPARATOR, MESSAGE_MAX_LEN,
};

/// Errors raised while building a message.
///
/// Decoding never fails: unrecognised input becomes a
/// [`MessageType::Error`] message instead.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Header names must be non-empty and contain neither `\n` nor `": "`.
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// Header values must not contain `\n`.
    #[error("invalid value for header {header:?}: values must not contain newlines")]
    InvalidHeaderValue { header: String },

    /// Adding the header would exceed [`HEADERS_MAX_COUNT`], which the
    /// decoder enforces on the receiving side.
    #[error("cannot add header {header:?}: a message holds at most {} headers", HEADERS_MAX_COUNT)]
    TooManyHeaders { header: String },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Serialises `msg` into its wire form, truncated to [`MESSAGE_MAX_LEN`].
///
/// Headers are written in the canonical order of the message type, followed
/// by any extension headers in name order. If the next pair would push the
/// output past the bound it is dropped together with everything after it.
///
/// # Examples
///
/// ```rust
/// use gdmp_core::protocol::{decode_message, encode_message, Message};
///
/// let msg = Message::text("Will", "G'day mate!", "12:34").unwrap();
/// let wire = encode_message(&msg);
/// assert!(wire.starts_with("GDMP_TEXT_MESSAGE\nUsername: Will\n"));
/// assert_eq!(decode_message(&wire), msg);
/// ```
pub fn encode_message(msg: &Message) -> String {
    encode_bounded(msg, MESSAGE_MAX_LEN)
}

/// Parses one message from `input`.
///
/// The first line must match a type name exactly; anything else yields an
/// empty [`MessageType::Error`] message. Header lines are split on the first
/// `": "`; a blank line or the end of input stops parsing. Required headers
/// are not checked here, see [`validate`].
pub fn decode_message(input: &str) -> Message {
    let (type_line, rest) = input.split_once('\n').unwrap_or((input, ""));

    let Some(kind) = MessageType::from_wire(type_line) else {
        debug!("unknown message type line: {type_line:?}");
        return Message::new(MessageType::Error);
    };

    let mut msg = Message::new(kind);
    for line in rest.split('\n') {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(HEADER_SEPARATOR) else {
            debug!("skipping header line without separator: {line:?}");
            continue;
        };
        if name.is_empty() {
            debug!("skipping header line with empty name");
            continue;
        }
        if !msg.contains_header(name) && msg.header_count() >= HEADERS_MAX_COUNT {
            debug!("header limit of {HEADERS_MAX_COUNT} reached, ignoring {name:?}");
            continue;
        }
        msg.insert_decoded(name, value);
    }
    msg
}

/// Parses one message from raw socket bytes.
///
/// Bytes that are not valid UTF-8 yield a [`MessageType::Error`] message.
pub fn decode_bytes(bytes: &[u8]) -> Message {
    match std::str::from_utf8(bytes) {
        Ok(text) => decode_message(text),
        Err(e) => {
            debug!("received non-UTF-8 payload: {e}");
            Message::new(MessageType::Error)
        }
    }
}

/// Returns `true` iff every header required by the message's type is present.
pub fn validate(msg: &Message) -> bool {
    msg.kind()
        .required_headers()
        .iter()
        .all(|h| msg.contains_header(h))
}

// ── Encoding helpers ──────────────────────────────────────────────────────────

fn encode_bounded(msg: &Message, limit: usize) -> String {
    let type_name = msg.kind().as_str();
    let mut out = String::with_capacity(limit.min(256));
    if type_name.len() + 1 > limit {
        warn!("encode limit {limit} cannot hold the type line");
        return out;
    }
    out.push_str(type_name);
    out.push('\n');

    for (name, value) in ordered_headers(msg) {
        let pair_len = name.len() + HEADER_SEPARATOR.len() + value.len() + 1;
        if out.len() + pair_len > limit {
            warn!(
                "message truncated at header {name:?}: {} + {pair_len} bytes exceeds {limit}",
                out.len()
            );
            break;
        }
        out.push_str(name);
        out.push_str(HEADER_SEPARATOR);
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Canonical headers first (when present), then the rest in name order.
fn ordered_headers(msg: &Message) -> Vec<(&str, &str)> {
    let canonical = msg.kind().canonical_headers();
    let mut ordered: Vec<(&str, &str)> = canonical
        .iter()
        .filter_map(|name| msg.header(name).map(|value| (*name, value)))
        .collect();
    ordered.extend(msg.headers().filter(|(name, _)| !canonical.contains(name)));
    ordered
}

// ── Tests ─────────────────────────────────────────────────────────────────────
