//! Protocol module containing the message model and the text codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_bytes, decode_message, encode_message, validate, ProtocolError};
pub use messages::*;
