//! The relay's units of deferred work.
//!
//! Each variant carries owned data only: an `Arc` to the connection it acts
//! on and, for sends, the recipient's private copy of the message.  A task is
//! executed by exactly one worker and is never re-enqueued.

use std::sync::Arc;

use gdmp_core::Message;

use crate::infrastructure::network::registry::{Connection, ConnectionId};

#[derive(Debug)]
pub enum Task {
    /// Read one message from a connection that the multiplexer reported
    /// readable.  The connection is in-flight until this task re-registers it.
    Receive { connection: Arc<Connection> },
    /// Write one encoded message to a recipient.
    Send {
        connection: Arc<Connection>,
        message: Message,
    },
}

impl Task {
    pub fn receive(connection: Arc<Connection>) -> Self {
        Task::Receive { connection }
    }

    pub fn send(connection: Arc<Connection>, message: Message) -> Self {
        Task::Send {
            connection,
            message,
        }
    }

    /// The connection this task reads from or writes to.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Task::Receive { connection } | Task::Send { connection, .. } => connection.id(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::Receive { .. } => "receive",
            Task::Send { .. } => "send",
        }
    }
}
