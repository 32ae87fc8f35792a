//! Server driven one readiness cycle at a time.
//!
//! `SteppedServer` owns a bound [`Server`] but never runs its loop on its
//! own. Tests call [`SteppedServer::step`] (or one of the pump helpers) after
//! each client action, then assert on the registry. Everything stays on the
//! test thread, so registry state is read without synchronization.

use std::{
    io,
    net::SocketAddr,
    time::{Duration, Instant},
};

use relaychat_core::ConnectionRegistry;
use relaychat_server::{Server, ServerError, ServerRuntimeConfig};

use crate::TestClient;

/// Readiness wait used by harness servers. Short so pump loops stay tight.
const HARNESS_POLL_TIMEOUT: Duration = Duration::from_millis(5);

/// Runtime config bound to an ephemeral loopback port.
pub fn loopback_config() -> ServerRuntimeConfig {
    ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        poll_timeout: HARNESS_POLL_TIMEOUT,
        ..Default::default()
    }
}

/// Test-driven relay server.
pub struct SteppedServer {
    server: Server,
    addr: SocketAddr,
}

impl SteppedServer {
    /// Bind with default limits on an ephemeral loopback port.
    pub fn bind() -> Result<Self, ServerError> {
        Self::bind_with_config(loopback_config())
    }

    /// Bind with a custom config.
    pub fn bind_with_config(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let server = Server::bind(config)?;
        let addr = server.local_addr()?;
        Ok(Self { server, addr })
    }

    /// Run one readiness cycle.
    pub fn step(&mut self) -> Result<(), ServerError> {
        self.server.run_cycle()
    }

    /// Step until `done` holds, giving up after `timeout`.
    ///
    /// Returns whether the condition was reached.
    pub fn pump_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&Server) -> bool,
    ) -> Result<bool, ServerError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.step()?;
            if done(&self.server) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    /// Step for a fixed wall-clock duration.
    pub fn pump_for(&mut self, duration: Duration) -> Result<(), ServerError> {
        self.pump_until(duration, |_| false).map(|_| ())
    }

    /// Connect a client and step until the server has registered it.
    ///
    /// Fails with `TimedOut` if the registry does not grow within a second,
    /// which is what happens when the server is full.
    pub fn connect(&mut self) -> io::Result<TestClient> {
        let before = self.connection_count();
        let client = TestClient::connect(self.addr)?;

        let registered = self
            .pump_until(Duration::from_secs(1), |s| s.connection_count() > before)
            .map_err(|e| io::Error::other(e.to_string()))?;

        if !registered {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "client was not registered"));
        }

        tracing::debug!(local = %client.local_addr()?, "harness client registered");
        Ok(client)
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        self.server.registry()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.server.connection_count()
    }

    /// Wrapped server.
    pub fn server(&self) -> &Server {
        &self.server
    }
}
