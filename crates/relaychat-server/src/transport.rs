//! TCP listener transport.
//!
//! Wraps the listening socket: creation, `SO_REUSEADDR`, bind, listen with an
//! explicit backlog, and non-blocking mode. The event loop only needs two
//! things from it: a handle it can register with the poller, and `accept`.

use std::{io, net::SocketAddr};

use mio::{
    Interest, Registry, Token,
    net::{TcpListener, TcpStream},
};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::ServerError;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 512;

/// Non-blocking TCP listener.
pub struct TcpTransport {
    /// Listening socket
    listener: TcpListener,
}

impl TcpTransport {
    /// Create, bind and start listening on `address`.
    ///
    /// Every failure here is a startup error: the relay cannot run without its
    /// listener.
    pub fn bind(address: &str, backlog: u32) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Transport(format!("failed to create socket: {e}")))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Transport(format!("failed to set SO_REUSEADDR: {e}")))?;

        socket
            .bind(&addr.into())
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        socket
            .listen(i32::try_from(backlog).unwrap_or(i32::MAX))
            .map_err(|e| ServerError::Transport(format!("failed to listen on {addr}: {e}")))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Transport(format!("failed to set non-blocking: {e}")))?;

        let listener = TcpListener::from_std(socket.into());

        tracing::info!(%addr, backlog, "TCP transport bound");

        Ok(Self { listener })
    }

    /// Register the listener with a poller for read readiness.
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.listener, token, Interest::READABLE)
    }

    /// Accept one pending connection.
    ///
    /// Returns `Ok(None)` when no connection is pending. Interrupted calls
    /// are retried.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok(pair) => return Ok(Some(pair)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}
