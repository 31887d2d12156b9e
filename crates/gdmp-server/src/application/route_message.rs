//! RouteMessage use case: decide what the relay does with a decoded message.
//!
//! ```text
//! GDMP_TEXT_MESSAGE  + all required headers  ──►  Broadcast
//! GDMP_TEXT_MESSAGE  missing a header        ──►  Discard(MissingHeaders)
//! GDMP_JOIN_MESSAGE                          ──►  Join (no-op for now)
//! GDMP_ERROR_MESSAGE (undecodable input)     ──►  Discard(UnknownType)
//! ```
//!
//! A discarded message never costs the sender its connection: the
//! dispatcher logs it and keeps reading from the same socket.

use gdmp_core::protocol::messages::headers;
use gdmp_core::{validate, Message, MessageType};

/// Why a message was dropped instead of relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The type line did not name a known message type.
    UnknownType,
    /// The message lacked headers its type requires.
    MissingHeaders(Vec<&'static str>),
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::UnknownType => f.write_str("unknown message type"),
            DiscardReason::MissingHeaders(missing) => {
                write!(f, "missing required header(s): {}", missing.join(", "))
            }
        }
    }
}

/// The relay's decision for one received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Copy the message to every other connection.
    Broadcast,
    /// A participant announced itself.  Reserved for presence handling; the
    /// relay currently only records it in the log.
    Join { username: Option<String> },
    /// Drop the message.
    Discard(DiscardReason),
}

/// Classifies `msg` by its type, validating the header schema on the way.
pub fn route_by_type(msg: &Message) -> Route {
    match msg.kind() {
        MessageType::Error => Route::Discard(DiscardReason::UnknownType),
        _ if !validate(msg) => Route::Discard(DiscardReason::MissingHeaders(msg.missing_headers())),
        MessageType::Text => Route::Broadcast,
        MessageType::Join => Route::Join {
            username: msg.header(headers::USERNAME).map(str::to_string),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gdmp_core::decode_message;

    #[test]
    fn test_valid_text_message_is_broadcast() {
        // Arrange
        let msg = decode_message(
            "GDMP_TEXT_MESSAGE\nUsername: Will\nContent: G'day mate!\nTimestamp: 12:34\n",
        );

        // Act / Assert
        assert_eq!(route_by_type(&msg), Route::Broadcast);
    }

    #[test]
    fn test_text_missing_timestamp_is_discarded() {
        let msg = decode_message("GDMP_TEXT_MESSAGE\nUsername: Will\nContent: hi\n");

        assert_eq!(
            route_by_type(&msg),
            Route::Discard(DiscardReason::MissingHeaders(vec!["Timestamp"]))
        );
    }

    #[test]
    fn test_text_without_headers_lists_every_missing_header() {
        let msg = Message::new(MessageType::Text);

        let Route::Discard(DiscardReason::MissingHeaders(missing)) = route_by_type(&msg) else {
            panic!("expected a discard");
        };
        assert_eq!(missing, vec!["Username", "Content", "Timestamp"]);
    }

    #[test]
    fn test_join_carries_optional_username() {
        assert_eq!(
            route_by_type(&Message::join("Ana").unwrap()),
            Route::Join {
                username: Some("Ana".to_string())
            }
        );
        assert_eq!(
            route_by_type(&Message::new(MessageType::Join)),
            Route::Join { username: None }
        );
    }

    #[test]
    fn test_undecodable_input_is_discarded_as_unknown_type() {
        let msg = decode_message("HELLO\n");
        assert_eq!(route_by_type(&msg), Route::Discard(DiscardReason::UnknownType));
    }

    #[test]
    fn test_discard_reason_display() {
        assert_eq!(DiscardReason::UnknownType.to_string(), "unknown message type");
        assert_eq!(
            DiscardReason::MissingHeaders(vec!["Content", "Timestamp"]).to_string(),
            "missing required header(s): Content, Timestamp"
        );
    }
}
