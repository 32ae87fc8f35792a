//! Server running its own loop on a background thread.

use std::{
    net::SocketAddr,
    thread::{self, JoinHandle},
};

use relaychat_server::{Server, ServerError, ServerRuntimeConfig};

use crate::loopback_config;

/// Relay server running `Server::run` on a dedicated thread.
///
/// The loop has no shutdown path, so the thread lives until the test process
/// exits. Use [`crate::SteppedServer`] when a test needs to inspect state.
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Start with default limits on an ephemeral loopback port.
    pub fn start() -> Result<Self, ServerError> {
        Self::start_with_config(loopback_config())
    }

    /// Start with a custom config.
    ///
    /// Binding happens on the calling thread, so the listener is accepting
    /// once this returns.
    pub fn start_with_config(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let server = Server::bind(config)?;
        let addr = server.local_addr()?;

        let handle = thread::Builder::new()
            .name(format!("relaychat-server-{}", addr.port()))
            .spawn(move || server.run())?;

        Ok(Self { addr, handle })
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the loop has exited (only on a fatal error).
    pub fn has_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}
