//! Listening socket setup.
//!
//! `std::net::TcpListener::bind` offers no way to set `SO_REUSEADDR` before
//! binding or to choose the accept backlog, so the socket is built with
//! `socket2` and then handed to `mio` in non-blocking mode.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};

/// Creates a non-blocking listener bound to `addr` with the given backlog.
///
/// `SO_REUSEADDR` is set before `bind`, so a restarted relay can reclaim a
/// port whose previous connections are still in `TIME_WAIT`.
///
/// # Errors
///
/// Returns the underlying I/O error from `socket`, `setsockopt`, `bind`, or
/// `listen`.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<mio::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
    socket.listen(backlog)?;
    Ok(mio::net::TcpListener::from_std(socket.into()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_listener_on_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_bind_listener_sets_reuse_address() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let socket = socket2::SockRef::from(&listener);
        assert!(socket.reuse_address().unwrap());
    }

    #[test]
    fn test_bind_listener_accepts_connections() {
        // Arrange
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = listener.local_addr().unwrap();

        // Act
        let _client = std::net::TcpStream::connect(addr).unwrap();

        // Assert: the listener is non-blocking, so poll accept briefly
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            match listener.accept() {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    assert!(std::time::Instant::now() < deadline, "accept timed out");
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => panic!("accept failed: {e}"),
            }
        }
    }

    #[test]
    fn test_bind_listener_fails_when_port_is_taken() {
        // A socket that is actively listening cannot be rebound even with
        // SO_REUSEADDR on Linux.
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = first.local_addr().unwrap();

        let second = bind_listener(addr, 5);

        assert!(second.is_err());
    }
}
