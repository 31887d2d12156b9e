//! Server: the multiplexer loop and its shutdown handle.
//!
//! # Event loop (for beginners)
//!
//! `mio::Poll` wraps the OS readiness API (epoll on Linux, kqueue on BSD and
//! macOS).  The loop blocks in `poll()` until at least one watched descriptor
//! has something to report, then handles each event by token:
//!
//! | Token              | Meaning                | Action                               |
//! |--------------------|------------------------|--------------------------------------|
//! | `LISTENER_TOKEN`   | clients are waiting    | accept all of them, admit each       |
//! | `WAKER_TOKEN`      | shutdown was requested | none; the flag is checked next turn  |
//! | any other          | a client sent data     | deregister, queue a receive task     |
//!
//! The multiplexer performs no reads or writes on client sockets itself.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Poll, Waker};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::infrastructure::storage::config::{ConfigError, ServerConfig};
use crate::infrastructure::worker_pool::{PoolError, Task, TaskQueue, WorkerPool};

use super::dispatch::Dispatcher;
use super::listener::bind_listener;
use super::registry::{
    ConnectionId, ConnectionRegistry, RegistryError, LISTENER_TOKEN, WAKER_TOKEN,
};

/// Readiness events fetched per `poll()` call.
const EVENTS_CAPACITY: usize = 1024;

/// Error type for building and running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration cannot be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listening socket could not be created.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The OS poller or waker could not be created.
    #[error("failed to set up readiness polling: {0}")]
    PollSetup(#[source] io::Error),

    /// Waiting for readiness failed.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ── Shutdown signalling ───────────────────────────────────────────────────────

struct ShutdownSignal {
    requested: AtomicBool,
    waker: Waker,
}

/// Cloneable, thread-safe control handle for a [`Server`].
#[derive(Clone)]
pub struct ServerHandle {
    signal: Arc<ShutdownSignal>,
    registry: Arc<ConnectionRegistry>,
}

impl ServerHandle {
    /// Asks the server loop to stop.  Returns immediately; calling it more
    /// than once has no further effect.
    pub fn shutdown(&self) {
        if self.signal.requested.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutdown requested");
        if let Err(e) = self.signal.waker.wake() {
            warn!("failed to wake the multiplexer: {e}");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal.requested.load(Ordering::Acquire)
    }

    /// Number of currently open client connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A bound, ready-to-run relay.
///
/// Construction binds the listener and starts the worker threads; [`start`]
/// runs the multiplexer on the calling thread until [`ServerHandle::shutdown`]
/// is called.
///
/// [`start`]: Server::start
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    pool: WorkerPool<Task>,
    signal: Arc<ShutdownSignal>,
    poll_timeout: Option<Duration>,
    local_addr: SocketAddr,
}

impl Server {
    /// Validates `config`, binds the listener and spawns the worker pool.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] for an unusable configuration.
    /// - [`ServerError::Bind`] if the address cannot be bound.
    /// - [`ServerError::PollSetup`] / [`ServerError::Registry`] if polling
    ///   cannot be set up.
    /// - [`ServerError::Pool`] if the worker threads cannot be started.
    pub fn new(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let mut listener =
            bind_listener(addr, config.backlog).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let poll = Poll::new().map_err(ServerError::PollSetup)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::PollSetup)?;
        let poller = poll.registry().try_clone().map_err(ServerError::PollSetup)?;

        let registry = Arc::new(ConnectionRegistry::new(poller, config.max_connections));
        registry.register_listener(&mut listener)?;

        let queue = Arc::new(TaskQueue::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&queue));
        let pool = WorkerPool::spawn(config.worker_threads, queue, dispatcher)?;

        info!(
            "relay bound to {local_addr} ({} workers, up to {} connections)",
            config.worker_threads, config.max_connections
        );

        Ok(Self {
            poll,
            listener,
            registry,
            pool,
            signal: Arc::new(ShutdownSignal {
                requested: AtomicBool::new(false),
                waker,
            }),
            poll_timeout: config.poll_timeout(),
            local_addr,
        })
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            signal: Arc::clone(&self.signal),
            registry: Arc::clone(&self.registry),
        }
    }

    /// The address actually bound, useful when the configured port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the multiplexer until shutdown is requested, then stops the
    /// workers and closes every connection.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Poll`] if the readiness wait fails with anything
    /// other than `EINTR`.  Teardown runs in either case.
    pub fn start(mut self) -> Result<(), ServerError> {
        info!("relay listening on {}", self.local_addr);
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        let result = loop {
            if self.signal.requested.load(Ordering::Acquire) {
                break Ok(());
            }

            if let Err(e) = self.poll.poll(&mut events, self.poll_timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("poll failed: {e}");
                break Err(ServerError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_pending(),
                    WAKER_TOKEN => {}
                    token => self.dispatch_ready(ConnectionId::from_token(token)),
                }
            }
        };

        self.teardown();
        result
    }

    /// Accepts until the backlog is empty; the listener is edge-triggered.
    fn accept_pending(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => match self.registry.admit(stream, peer) {
                    Ok(connection) => debug!("{} connected from {peer}", connection.id()),
                    Err(e) => warn!("rejected connection from {peer}: {e}"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Hands a readable connection to the worker pool.
    fn dispatch_ready(&self, id: ConnectionId) {
        let Some(connection) = self.registry.deregister_for_polling(id) else {
            debug!("stale readiness event for {id}");
            return;
        };
        if !self.pool.submit(Task::receive(connection)) {
            debug!("{id}: pool is shutting down, closing");
            self.registry.remove(id);
        }
    }

    fn teardown(&mut self) {
        self.pool.shutdown_and_join();
        let closed = self.registry.close_all();
        self.registry.deregister_listener(&mut self.listener);
        info!("relay stopped, {closed} connection(s) closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
