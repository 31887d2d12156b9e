//! Dispatcher: the [`TaskHandler`] that runs receive and send tasks.
//!
//! # Receive path
//!
//! ```text
//! read() ──► n > 0        decode ─► route ─► (fan-out) ─► re-register
//!        ──► n == 0       peer closed ─► remove + close
//!        ──► WouldBlock   spurious wake-up ─► re-register
//!        ──► other error  log ─► remove + close
//! ```
//!
//! Exactly one read is performed per task.  GDMP has no framing, so a read is
//! assumed to hold exactly one message: two messages coalesced into one TCP
//! segment decode as the first, and a message split across segments decodes
//! as a truncated one that fails validation.
//!
//! A task body that panics closes its connection instead of leaving it
//! in-flight.
//!
//! # Send path
//!
//! One best-effort non-blocking write.  If the recipient's socket buffer is
//! full the message is not delivered; there is no retry queue.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use gdmp_core::{decode_bytes, encode_message, Message, MESSAGE_MAX_LEN};
use tracing::{debug, error, info, warn};

use crate::application::route_message::{route_by_type, Route};
use crate::infrastructure::worker_pool::{Task, TaskHandler, TaskQueue};

use super::registry::{Connection, ConnectionId, ConnectionRegistry, RegistryError};

/// What a receive task did with its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A message was read and routed; the connection was re-registered.
    Processed(Route),
    /// The peer closed the connection; it was removed.
    PeerClosed,
    /// Nothing to read yet; the connection was re-registered.
    WouldBlock,
    /// A hard I/O error; the connection was removed.
    Failed,
}

/// What a send task achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Only the first `n` bytes were accepted by the socket.
    Partial(usize),
    /// The recipient's send buffer was full; the message was dropped.
    Dropped,
    /// A hard I/O error; the recipient was removed.
    Failed,
}

/// Executes [`Task`]s against the shared registry.
///
/// Holds a handle to the pool's queue so that a receive task can enqueue the
/// send tasks of its fan-out.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    queue: Arc<TaskQueue<Task>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, queue: Arc<TaskQueue<Task>>) -> Self {
        Self { registry, queue }
    }

    /// Reads once from an in-flight connection and acts on the result, then
    /// returns the connection to the poll set or drops it.
    pub fn receive(&self, connection: &Arc<Connection>) -> ReceiveOutcome {
        let outcome = self.read_and_route(connection);
        self.settle(connection, &outcome);
        outcome
    }

    /// The part of a receive task that owns the socket: one read, then
    /// decode and route.  The connection is still in-flight on return.
    fn read_and_route(&self, connection: &Connection) -> ReceiveOutcome {
        let id = connection.id();
        let mut buf = [0u8; MESSAGE_MAX_LEN];

        match connection.read(&mut buf) {
            Ok(0) => {
                debug!("{id} disconnected");
                ReceiveOutcome::PeerClosed
            }
            Ok(n) => {
                let message = decode_bytes(&buf[..n]);
                let route = route_by_type(&message);
                self.apply_route(id, &route, &message);
                ReceiveOutcome::Processed(route)
            }
            Err(e) if is_transient(&e) => ReceiveOutcome::WouldBlock,
            Err(e) => {
                error!("{id}: recv failed: {e}");
                ReceiveOutcome::Failed
            }
        }
    }

    /// Ends the in-flight period: re-arm after a read that left the socket
    /// usable, remove it otherwise.
    fn settle(&self, connection: &Connection, outcome: &ReceiveOutcome) {
        match outcome {
            ReceiveOutcome::Processed(_) | ReceiveOutcome::WouldBlock => self.rearm(connection),
            ReceiveOutcome::PeerClosed | ReceiveOutcome::Failed => {
                self.registry.remove(connection.id());
            }
        }
    }

    /// Runs one task body and drops its connection if the body panics, so a
    /// failed receive cannot leave the connection in-flight and holding a
    /// capacity slot.
    fn guarded<F: FnOnce()>(&self, name: &'static str, id: ConnectionId, body: F) {
        if catch_unwind(AssertUnwindSafe(body)).is_err() {
            error!("{id}: {name} task panicked, closing connection");
            self.registry.remove(id);
        }
    }

    /// Enqueues one send task per connection other than `sender`, each with
    /// its own copy of `message`.  Returns the number of tasks enqueued.
    pub fn broadcast_text(&self, sender: ConnectionId, message: &Message) -> usize {
        let mut enqueued = 0;
        for peer in self.registry.peers_except(sender) {
            if self.queue.enqueue(Task::send(peer, message.clone())) {
                enqueued += 1;
            }
        }
        enqueued
    }

    /// Encodes `message` and writes it to `connection` once.
    pub fn send(&self, connection: &Connection, message: &Message) -> SendOutcome {
        let id = connection.id();
        let wire = encode_message(message);

        match connection.write(wire.as_bytes()) {
            Ok(n) if n == wire.len() => SendOutcome::Delivered,
            Ok(n) => {
                warn!("{id}: short write, {n} of {} bytes sent", wire.len());
                SendOutcome::Partial(n)
            }
            Err(e) if is_transient(&e) => {
                debug!("{id}: send buffer full, message dropped");
                SendOutcome::Dropped
            }
            Err(e) => {
                warn!("{id}: send failed: {e}");
                self.registry.remove(id);
                SendOutcome::Failed
            }
        }
    }

    fn apply_route(&self, sender: ConnectionId, route: &Route, message: &Message) {
        match route {
            Route::Broadcast => {
                let recipients = self.broadcast_text(sender, message);
                debug!("{sender}: text message fanned out to {recipients} recipient(s)");
            }
            Route::Join { username } => {
                info!(
                    "{sender}: join from {}",
                    username.as_deref().unwrap_or("<anonymous>")
                );
            }
            Route::Discard(reason) => {
                warn!("{sender}: discarded {} ({reason})", message.kind());
            }
        }
    }

    /// Returns an in-flight connection to the poll set, dropping it if that
    /// is impossible.
    fn rearm(&self, connection: &Connection) {
        let id = connection.id();
        match self.registry.register_for_polling(connection) {
            Ok(()) => {}
            Err(RegistryError::UnknownConnection(_)) => {
                debug!("{id} removed while in flight");
            }
            Err(e) => {
                warn!("{id}: cannot re-register, dropping: {e}");
                self.registry.remove(id);
            }
        }
    }
}

impl TaskHandler<Task> for Dispatcher {
    fn handle(&self, task: Task) {
        let name = task.name();
        let id = task.connection_id();
        self.guarded(name, id, || match task {
            Task::Receive { connection } => {
                self.receive(&connection);
            }
            Task::Send {
                connection,
                message,
            } => {
                self.send(&connection, &message);
            }
        });
    }
}

/// Would-block and EINTR are retried on the next readiness notification.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
