//! GDMP message types and header schema.
//!
//! A GDMP message is a type tag plus a flat map of `Header: Value` pairs.
//! Each type carries a fixed schema: the headers it *requires* (checked by
//! [`validate`](crate::protocol::codec::validate)) and the canonical order in
//! which known headers are written on the wire.

use std::collections::BTreeMap;

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Maximum size of an encoded message in bytes, type line included.
pub const MESSAGE_MAX_LEN: usize = 1024;

/// Maximum number of distinct headers kept when decoding a message.
pub const HEADERS_MAX_COUNT: usize = 10;

/// Separator between a header name and its value.
pub const HEADER_SEPARATOR: &str = ": ";

/// Well-known header names.
pub mod headers {
    pub const USERNAME: &str = "Username";
    pub const CONTENT: &str = "Content";
    pub const TIMESTAMP: &str = "Timestamp";
}

// ── Message type ──────────────────────────────────────────────────────────────

/// All message types defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A chat line relayed to every other participant.
    Text,
    /// A participant announcing itself. Accepted but not acted upon yet.
    Join,
    /// Sentinel produced by the decoder for unrecognised input. Never sent
    /// intentionally.
    Error,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 3] = [MessageType::Text, MessageType::Join, MessageType::Error];

    /// Returns the type name written on the first line of the wire format.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "GDMP_TEXT_MESSAGE",
            MessageType::Join => "GDMP_JOIN_MESSAGE",
            MessageType::Error => "GDMP_ERROR_MESSAGE",
        }
    }

    /// Matches a type line exactly against the known type names.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Headers that must be present for a message of this type to validate.
    pub fn required_headers(self) -> &'static [&'static str] {
        match self {
            MessageType::Text => &[headers::USERNAME, headers::CONTENT, headers::TIMESTAMP],
            MessageType::Join | MessageType::Error => &[],
        }
    }

    /// Known headers for this type, in the order the encoder writes them.
    pub fn canonical_headers(self) -> &'static [&'static str] {
        match self {
            MessageType::Text => &[headers::USERNAME, headers::CONTENT, headers::TIMESTAMP],
            MessageType::Join => &[headers::USERNAME],
            MessageType::Error => &[],
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A decoded or under-construction GDMP message.
///
/// `Clone` is a deep copy: the header map is duplicated, so every fan-out
/// recipient can own and serialise its copy independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    headers: BTreeMap<String, String>,
}

impl Message {
    /// Creates an empty message of the given type.
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            headers: BTreeMap::new(),
        }
    }

    /// Builds a complete text message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHeaderValue`] if any value contains a
    /// newline.
    pub fn text(username: &str, content: &str, timestamp: &str) -> Result<Self, ProtocolError> {
        let mut msg = Self::new(MessageType::Text);
        msg.set_header(headers::USERNAME, username)?;
        msg.set_header(headers::CONTENT, content)?;
        msg.set_header(headers::TIMESTAMP, timestamp)?;
        Ok(msg)
    }

    /// Builds a join announcement for `username`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHeaderValue`] if `username` contains a
    /// newline.
    pub fn join(username: &str) -> Result<Self, ProtocolError> {
        let mut msg = Self::new(MessageType::Join);
        msg.set_header(headers::USERNAME, username)?;
        Ok(msg)
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Sets `name` to `value`, replacing and returning any previous value.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidHeaderName`] if the name is empty or contains
    ///   a newline or the `": "` separator.
    /// - [`ProtocolError::InvalidHeaderValue`] if the value contains a newline.
    /// - [`ProtocolError::TooManyHeaders`] if `name` is new and the message
    ///   already holds [`HEADERS_MAX_COUNT`] headers.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<Option<String>, ProtocolError> {
        if name.is_empty() || name.contains('\n') || name.contains(HEADER_SEPARATOR) {
            return Err(ProtocolError::InvalidHeaderName(name.to_string()));
        }
        if value.contains('\n') {
            return Err(ProtocolError::InvalidHeaderValue {
                header: name.to_string(),
            });
        }
        if !self.headers.contains_key(name) && self.headers.len() >= HEADERS_MAX_COUNT {
            return Err(ProtocolError::TooManyHeaders {
                header: name.to_string(),
            });
        }
        Ok(self.headers.insert(name.to_string(), value.to_string()))
    }

    /// Inserts a header that the decoder already split off a single line.
    pub(crate) fn insert_decoded(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Returns the value of `name`, or `None` if the header is absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    /// Iterates over all headers in lexicographic name order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Required headers for this message's type that are not present.
    pub fn missing_headers(&self) -> Vec<&'static str> {
        self.kind
            .required_headers()
            .iter()
            .copied()
            .filter(|h| !self.headers.contains_key(*h))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_wire_names_are_distinct() {
        let names: Vec<&str> = MessageType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(
            names,
            vec!["GDMP_TEXT_MESSAGE", "GDMP_JOIN_MESSAGE", "GDMP_ERROR_MESSAGE"]
        );
    }

    #[test]
    fn test_from_wire_matches_exactly() {
        assert_eq!(
            MessageType::from_wire("GDMP_TEXT_MESSAGE"),
            Some(MessageType::Text)
        );
        assert_eq!(MessageType::from_wire("GDMP_TEXT_MESSAGE "), None);
        assert_eq!(MessageType::from_wire("gdmp_text_message"), None);
        assert_eq!(MessageType::from_wire(""), None);
    }

    #[test]
    fn test_text_requires_username_content_timestamp() {
        assert_eq!(
            MessageType::Text.required_headers(),
            &["Username", "Content", "Timestamp"]
        );
        assert!(MessageType::Join.required_headers().is_empty());
        assert!(MessageType::Error.required_headers().is_empty());
    }

    #[test]
    fn test_set_header_replaces_existing_value() {
        // Arrange
        let mut msg = Message::new(MessageType::Text);
        msg.set_header("Username", "Will").unwrap();

        // Act
        let previous = msg.set_header("Username", "Ana").unwrap();

        // Assert
        assert_eq!(previous.as_deref(), Some("Will"));
        assert_eq!(msg.header("Username"), Some("Ana"));
        assert_eq!(msg.header_count(), 1);
    }

    #[test]
    fn test_set_header_rejects_header_beyond_limit() {
        // Arrange: a message already at the header limit
        let mut msg = Message::text("Will", "hi", "12:34").unwrap();
        for i in 0..(HEADERS_MAX_COUNT - 3) {
            msg.set_header(&format!("Ext{i}"), "v").unwrap();
        }
        assert_eq!(msg.header_count(), HEADERS_MAX_COUNT);

        // Act
        let result = msg.set_header("Ext-overflow", "v");

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::TooManyHeaders {
                header: "Ext-overflow".to_string()
            })
        );
        assert_eq!(msg.header_count(), HEADERS_MAX_COUNT);
        assert!(!msg.contains_header("Ext-overflow"));
    }

    #[test]
    fn test_set_header_replaces_existing_value_at_limit() {
        let mut msg = Message::text("Will", "hi", "12:34").unwrap();
        for i in 0..(HEADERS_MAX_COUNT - 3) {
            msg.set_header(&format!("Ext{i}"), "v").unwrap();
        }

        let previous = msg.set_header("Content", "changed").unwrap();

        assert_eq!(previous.as_deref(), Some("hi"));
        assert_eq!(msg.header("Content"), Some("changed"));
    }

    #[test]
    fn test_set_header_rejects_separator_in_name() {
        let mut msg = Message::new(MessageType::Text);
        let result = msg.set_header("User: name", "x");
        assert_eq!(
            result,
            Err(ProtocolError::InvalidHeaderName("User: name".to_string()))
        );
    }

    #[test]
    fn test_set_header_rejects_empty_name() {
        let mut msg = Message::new(MessageType::Join);
        assert!(matches!(
            msg.set_header("", "x"),
            Err(ProtocolError::InvalidHeaderName(_))
        ));
    }

    #[test]
    fn test_set_header_rejects_newline_in_value() {
        let mut msg = Message::new(MessageType::Text);
        let result = msg.set_header("Content", "line one\nline two");
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidHeaderValue { .. })
        ));
        assert!(!msg.contains_header("Content"));
    }

    #[test]
    fn test_missing_headers_lists_absent_required_headers() {
        // Arrange
        let mut msg = Message::new(MessageType::Text);
        msg.set_header("Username", "Will").unwrap();

        // Act
        let missing = msg.missing_headers();

        // Assert
        assert_eq!(missing, vec!["Content", "Timestamp"]);
    }

    #[test]
    fn test_clone_is_independent_of_original() {
        // Arrange
        let original = Message::text("Will", "hi", "12:34").unwrap();

        // Act
        let mut copy = original.clone();
        copy.set_header("Content", "changed").unwrap();

        // Assert
        assert_eq!(original.header("Content"), Some("hi"));
        assert_eq!(copy.header("Content"), Some("changed"));
    }

    #[test]
    fn test_join_builder_sets_username() {
        let msg = Message::join("Will").unwrap();
        assert_eq!(msg.kind(), MessageType::Join);
        assert_eq!(msg.header("Username"), Some("Will"));
    }
}
