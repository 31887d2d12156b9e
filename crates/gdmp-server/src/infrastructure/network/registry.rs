//! ConnectionRegistry: the single owner of every open client connection.
//!
//! # Connection lifecycle
//!
//! ```text
//!           admit()                 deregister_for_polling()
//!  accept ──────────►  Pollable  ─────────────────────────────►  InFlight
//!                         ▲                                         │
//!                         └──────────── register_for_polling() ─────┘
//!
//!  remove() from either state ──►  Closed (dropped from the registry)
//! ```
//!
//! A connection is `Pollable` while the multiplexer may report it ready and
//! `InFlight` while exactly one receive task owns it.  Both transitions happen
//! under the registry lock together with the matching poller update, so the
//! multiplexer can never hand the same socket to two workers.
//!
//! The lock is held for bookkeeping and `epoll_ctl`-style registration only;
//! socket reads and writes always happen outside it.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::net::{TcpListener, TcpStream};
use mio::unix::SourceFd;
use mio::{Interest, Token};
use thiserror::Error;
use tracing::{debug, warn};

use super::poll_set::PollSet;

/// Poller token of the listening socket.
pub const LISTENER_TOKEN: Token = Token(0);

/// Poller token of the shutdown waker.
pub const WAKER_TOKEN: Token = Token(1);

const FIRST_CONNECTION_TOKEN: usize = 2;

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The configured connection limit has been reached; the new socket was
    /// closed.
    #[error("connection limit of {max} reached")]
    AtCapacity { max: usize },

    /// The poll set has no room for another descriptor.
    #[error("poll set is full ({capacity} entries)")]
    PollSetFull { capacity: usize },

    /// The connection has already been removed.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The OS poller rejected a registration change.
    #[error("failed to update poller for {token:?}: {source}")]
    Poller {
        token: Token,
        #[source]
        source: io::Error,
    },
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Identifier of a client connection; doubles as its poller token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub fn token(self) -> Token {
        Token(self.0)
    }

    pub fn from_token(token: Token) -> Self {
        Self(token.0)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Where a connection currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Watched by the multiplexer.
    Pollable,
    /// Owned by a receive task; invisible to the multiplexer.
    InFlight,
    /// Removed from the registry; its socket is shut down.
    Closed,
}

/// One accepted client socket.
///
/// Shared via `Arc` between the registry and any outstanding tasks.  Reads
/// and writes go through `&TcpStream`, so no lock is needed to use it.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// One non-blocking read.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    /// One non-blocking write.
    pub fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        (&self.stream).write(bytes)
    }

    fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("{}: shutdown: {e}", self.id);
        }
    }

    fn register(&self, poller: &mio::Registry) -> Result<(), RegistryError> {
        let fd = self.stream.as_raw_fd();
        poller
            .register(&mut SourceFd(&fd), self.id.token(), Interest::READABLE)
            .map_err(|source| RegistryError::Poller {
                token: self.id.token(),
                source,
            })
    }

    fn deregister(&self, poller: &mio::Registry) {
        let fd = self.stream.as_raw_fd();
        if let Err(e) = poller.deregister(&mut SourceFd(&fd)) {
            warn!("{}: poller deregister failed: {e}", self.id);
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct Slot {
    connection: Arc<Connection>,
    state: ConnectionState,
}

struct RegistryState {
    slots: HashMap<ConnectionId, Slot>,
    poll_set: PollSet,
}

/// Thread-safe registry of open connections and the poll set.
pub struct ConnectionRegistry {
    poller: mio::Registry,
    max_connections: usize,
    next_id: AtomicUsize,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Creates an empty registry that registers sockets with `poller`.
    ///
    /// The poll set is sized for `max_connections` clients plus the listener.
    pub fn new(poller: mio::Registry, max_connections: usize) -> Self {
        Self {
            poller,
            max_connections,
            next_id: AtomicUsize::new(FIRST_CONNECTION_TOKEN),
            state: Mutex::new(RegistryState {
                slots: HashMap::new(),
                poll_set: PollSet::with_capacity(max_connections + 1),
            }),
        }
    }

    /// Watches the listening socket under [`LISTENER_TOKEN`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poller`] if the OS poller rejects the socket.
    pub fn register_listener(&self, listener: &mut TcpListener) -> Result<(), RegistryError> {
        let mut state = self.lock();
        self.poller
            .register(listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|source| RegistryError::Poller {
                token: LISTENER_TOKEN,
                source,
            })?;
        state.poll_set.insert(LISTENER_TOKEN, Interest::READABLE);
        Ok(())
    }

    /// Stops watching the listening socket.
    pub fn deregister_listener(&self, listener: &mut TcpListener) {
        let mut state = self.lock();
        if let Err(e) = self.poller.deregister(listener) {
            warn!("listener deregister failed: {e}");
        }
        state.poll_set.remove(LISTENER_TOKEN);
    }

    /// Takes ownership of a freshly accepted socket and makes it pollable.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::AtCapacity`] if `max_connections` are already open.
    /// - [`RegistryError::PollSetFull`] / [`RegistryError::Poller`] if the
    ///   socket cannot be watched.
    ///
    /// On any error the socket is closed; existing connections are untouched.
    pub fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<Arc<Connection>, RegistryError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.slots.len() >= self.max_connections {
            drop(guard);
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("closing rejected socket from {peer}: {e}");
            }
            return Err(RegistryError::AtCapacity {
                max: self.max_connections,
            });
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(Connection { id, peer, stream });

        if !state.poll_set.insert(id.token(), Interest::READABLE) {
            connection.close();
            return Err(RegistryError::PollSetFull {
                capacity: state.poll_set.capacity(),
            });
        }
        if let Err(e) = connection.register(&self.poller) {
            state.poll_set.remove(id.token());
            connection.close();
            return Err(e);
        }

        state.slots.insert(
            id,
            Slot {
                connection: Arc::clone(&connection),
                state: ConnectionState::Pollable,
            },
        );
        Ok(connection)
    }

    /// Moves an in-flight connection back into the poll set.
    ///
    /// Registering a connection that is already pollable is a no-op.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if it was removed meanwhile.
    /// - [`RegistryError::PollSetFull`] / [`RegistryError::Poller`] if it
    ///   cannot be watched; the caller should drop the connection.
    pub fn register_for_polling(&self, connection: &Connection) -> Result<(), RegistryError> {
        let id = connection.id();
        let mut guard = self.lock();
        let state = &mut *guard;

        let slot = state
            .slots
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        if slot.state == ConnectionState::Pollable {
            return Ok(());
        }

        if !state.poll_set.insert(id.token(), Interest::READABLE) {
            return Err(RegistryError::PollSetFull {
                capacity: state.poll_set.capacity(),
            });
        }
        if let Err(e) = slot.connection.register(&self.poller) {
            state.poll_set.remove(id.token());
            return Err(e);
        }
        slot.state = ConnectionState::Pollable;
        Ok(())
    }

    /// Takes a ready connection out of the poll set and marks it in-flight.
    ///
    /// Returns `None` if the connection is unknown or already in-flight, so a
    /// stale readiness event can never produce a second receive task.
    pub fn deregister_for_polling(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let slot = state.slots.get_mut(&id)?;
        if slot.state != ConnectionState::Pollable {
            return None;
        }
        slot.connection.deregister(&self.poller);
        slot.state = ConnectionState::InFlight;
        state.poll_set.remove(id.token());
        Some(Arc::clone(&slot.connection))
    }

    /// Forgets a connection and shuts its socket down.
    ///
    /// Returns `false` if it had already been removed.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut state = self.lock();
            let Some(slot) = state.slots.remove(&id) else {
                return false;
            };
            if slot.state == ConnectionState::Pollable {
                slot.connection.deregister(&self.poller);
                state.poll_set.remove(id.token());
            }
            slot.connection
        };
        removed.close();
        debug!("{id} ({}) closed", removed.peer_addr());
        true
    }

    /// Closes every remaining connection.  Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Slot> = {
            let mut state = self.lock();
            let drained: Vec<Slot> = state.slots.drain().map(|(_, slot)| slot).collect();
            for slot in &drained {
                if slot.state == ConnectionState::Pollable {
                    slot.connection.deregister(&self.poller);
                    state.poll_set.remove(slot.connection.id().token());
                }
            }
            drained
        };
        for slot in &drained {
            slot.connection.close();
        }
        drained.len()
    }

    /// Every live connection except `sender`, pollable or in-flight.
    pub fn peers_except(&self, sender: ConnectionId) -> Vec<Arc<Connection>> {
        self.lock()
            .slots
            .values()
            .filter(|slot| slot.connection.id() != sender)
            .map(|slot| Arc::clone(&slot.connection))
            .collect()
    }

    pub fn state_of(&self, id: ConnectionId) -> ConnectionState {
        self.lock()
            .slots
            .get(&id)
            .map_or(ConnectionState::Closed, |slot| slot.state)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().slots.contains_key(&id)
    }

    /// Number of open client connections.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Number of entries in the poll set, listener included.
    pub fn poll_set_len(&self) -> usize {
        self.lock().poll_set.len()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
