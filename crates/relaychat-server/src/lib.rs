//! relaychat server.
//!
//! A single-threaded TCP chat relay: every chunk a client sends is relayed,
//! prefixed with its nickname, to every other connected client.
//!
//! # Architecture
//!
//! [`ChatDriver`] is pure logic: it owns the connection registry and turns
//! events into actions without touching a socket. [`Server`] is the runtime:
//! it owns the listener, the poller and every client socket, runs the
//! readiness loop, and executes the driver's actions.
//!
//! # Components
//!
//! - [`ChatDriver`]: Action-based relay logic (pure, no I/O)
//! - [`Server`]: Readiness event loop that executes driver actions
//! - [`TcpTransport`]: Listening socket
//! - [`OutboundQueue`]: Bounded per-connection write buffer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
pub mod outbound;
mod server_error;
mod transport;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::{self, Read},
    net::SocketAddr,
    time::Duration,
};

use bytes::Bytes;
pub use driver::{ChatAction, ChatDriver, ChatEvent, CloseReason, DriverConfig, LogLevel};
pub use error::ServerError;
use mio::{Events, Interest, Poll, Registry, Token, net::TcpStream};
pub use outbound::{
    BroadcastPolicy, DEFAULT_OUTBOUND_LIMIT, FlushStatus, OutboundQueue, QueueFull,
};
use relaychat_core::{ConnectionId, ConnectionRegistry, wire::DEFAULT_READ_CHUNK_SIZE};
pub use server_error::DriverError;
pub use transport::{DEFAULT_BACKLOG, TcpTransport};

/// Poll token of the listening socket. Connection tokens are their ids.
pub const LISTENER: Token = Token(usize::MAX - 1);

/// Maximum readiness events handled per cycle.
const EVENTS_CAPACITY: usize = 1024;

/// Maximum accept attempts per cycle. Whatever remains in the backlog is
/// picked up next cycle.
const ACCEPT_BUDGET: usize = 128;

/// Largest accepted registry capacity. The registry preallocates one slot
/// per connection, and every id must stay clear of [`LISTENER`].
pub const MAX_CAPACITY: usize = 1 << 20;

/// Server configuration for the runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Listen backlog
    pub backlog: u32,
    /// Maximum bytes read per chunk; each chunk is relayed as one message
    pub read_chunk_size: usize,
    /// How long one readiness wait may block before a tick
    pub poll_timeout: Duration,
    /// Outbound queue limit per connection, in bytes
    pub outbound_limit: usize,
    /// What to do with a recipient whose outbound queue is full
    pub broadcast_policy: BroadcastPolicy,
    /// Driver configuration (capacity)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: DEFAULT_BACKLOG,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_timeout: Duration::from_secs(1),
            outbound_limit: DEFAULT_OUTBOUND_LIMIT,
            broadcast_policy: BroadcastPolicy::default(),
            driver: DriverConfig::default(),
        }
    }
}

/// Socket state for one registered connection.
struct Peer {
    /// Non-blocking client socket
    stream: TcpStream,
    /// Remote address, for logging
    addr: SocketAddr,
    /// Bytes not yet accepted by the kernel
    outbound: OutboundQueue,
    /// Interest currently registered with the poller
    interest: Interest,
}

impl Peer {
    /// Switch poller interest, skipping the syscall when unchanged.
    fn set_interest(
        &mut self,
        registry: &Registry,
        conn_id: ConnectionId,
        interest: Interest,
    ) -> io::Result<()> {
        if self.interest != interest {
            registry.reregister(&mut self.stream, token(conn_id), interest)?;
            self.interest = interest;
        }
        Ok(())
    }

    /// Write as much queued output as the socket takes right now.
    ///
    /// A write error discards the queue but keeps the connection: a dead peer
    /// is noticed by its next failed read.
    fn flush(&mut self, registry: &Registry, conn_id: ConnectionId) {
        let status = match self.outbound.flush(&mut self.stream) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    %conn_id,
                    peer = %self.addr,
                    error = %e,
                    dropped = self.outbound.len(),
                    "write failed, discarding queued output"
                );
                self.outbound.clear();
                FlushStatus::Drained
            },
        };
        self.watch_output(registry, conn_id, status);
    }

    /// Match poller interest to the queue after a flush.
    ///
    /// Queued bytes are only ever flushed on writable readiness, so if that
    /// interest cannot be registered the queue is discarded like after a
    /// write error.
    fn watch_output(&mut self, registry: &Registry, conn_id: ConnectionId, status: FlushStatus) {
        match status {
            FlushStatus::Drained => {
                // A stale WRITABLE interest only costs a spurious wakeup
                if let Err(e) = self.set_interest(registry, conn_id, Interest::READABLE) {
                    tracing::debug!(%conn_id, error = %e, "failed to drop writable interest");
                }
            },
            FlushStatus::Pending => {
                let interest = Interest::READABLE | Interest::WRITABLE;
                if let Err(e) = self.set_interest(registry, conn_id, interest) {
                    tracing::warn!(
                        %conn_id,
                        peer = %self.addr,
                        error = %e,
                        dropped = self.outbound.len(),
                        "cannot watch for writability, discarding queued output"
                    );
                    self.outbound.clear();
                }
            },
        }
    }
}

/// Work due for one connection in one cycle.
#[derive(Debug, Clone, Copy, Default)]
struct Readiness {
    readable: bool,
    writable: bool,
}

/// What is known about the listener's backlog after an accept pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backlog {
    /// Accept reported nothing pending
    Drained,
    /// The accept budget ran out; more may be waiting
    MorePending,
    /// Accept failed; retry after the next readiness wait
    Failed,
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset)
}

/// Accept up to `budget` pending connections.
///
/// Transient errors (a peer that gave up before being accepted) are skipped.
/// Any other error ends the pass with [`Backlog::Failed`] so the caller
/// retries instead of waiting for a new readiness edge that may never come.
fn drain_backlog<S>(
    mut accept: impl FnMut() -> io::Result<Option<(S, SocketAddr)>>,
    budget: usize,
) -> (Vec<(S, SocketAddr)>, Backlog) {
    let mut accepted = Vec::new();

    for _ in 0..budget {
        match accept() {
            Ok(Some(pair)) => accepted.push(pair),
            Ok(None) => return (accepted, Backlog::Drained),
            Err(e) if is_transient_accept_error(&e) => {
                tracing::warn!(error = %e, "transient accept error");
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to accept connection, retrying next cycle");
                return (accepted, Backlog::Failed);
            },
        }
    }

    (accepted, Backlog::MorePending)
}

fn token(conn_id: ConnectionId) -> Token {
    Token(conn_id.get())
}

/// Production relay server.
///
/// Wraps `ChatDriver` with a `mio` poller and TCP sockets. Everything runs on
/// the calling thread; the only blocking point is the readiness wait.
pub struct Server {
    /// The action-based relay driver
    driver: ChatDriver,
    /// Listening socket
    transport: TcpTransport,
    /// Readiness poller
    poll: Poll,
    /// Event buffer reused across cycles
    events: Events,
    /// Sockets of registered connections
    peers: HashMap<ConnectionId, Peer>,
    /// Read buffer, `read_chunk_size` bytes long
    read_buf: Vec<u8>,
    /// Connections whose last read filled data; they may have more buffered
    /// and will not get another readiness edge for it
    still_readable: BTreeSet<ConnectionId>,
    /// Listener state left by the last accept pass
    backlog: Backlog,
    /// Runtime configuration
    config: ServerRuntimeConfig,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.driver.capacity > MAX_CAPACITY {
            return Err(ServerError::Config(format!(
                "capacity {} exceeds maximum {MAX_CAPACITY}",
                config.driver.capacity
            )));
        }

        let mut transport = TcpTransport::bind(&config.bind_address, config.backlog)?;

        let poll = Poll::new()
            .map_err(|e| ServerError::Transport(format!("failed to create poller: {e}")))?;
        transport.register(poll.registry(), LISTENER)?;

        let driver = ChatDriver::new(config.driver.clone());

        // A zero-length buffer would make every read look like end of stream
        let read_buf = vec![0; config.read_chunk_size.max(1)];

        Ok(Self {
            driver,
            transport,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            peers: HashMap::new(),
            read_buf,
            still_readable: BTreeSet::new(),
            backlog: Backlog::Drained,
            config,
        })
    }

    /// Run the readiness loop.
    ///
    /// Only returns on a fatal error; there is no shutdown path.
    pub fn run(mut self) -> Result<(), ServerError> {
        tracing::info!(
            addr = %self.local_addr()?,
            capacity = self.driver.config().capacity,
            "Chat server has started up, waiting for connections"
        );

        loop {
            self.run_cycle()?;
        }
    }

    /// Run one readiness cycle: wait, accept, then service ready connections
    /// in ascending id order.
    ///
    /// Each connection gets at most one read per cycle. A connection whose
    /// read returned data is serviced again next cycle without waiting for a
    /// new readiness edge, and the wait does not block while such work is
    /// outstanding.
    ///
    /// Fails only if the readiness wait itself fails.
    pub fn run_cycle(&mut self) -> Result<(), ServerError> {
        let timeout = if self.still_readable.is_empty() && self.backlog != Backlog::MorePending {
            self.config.poll_timeout
        } else {
            Duration::ZERO
        };

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "readiness wait failed");
                return Err(ServerError::Poll(e));
            },
        }

        let carried_over = !self.still_readable.is_empty() || self.backlog != Backlog::Drained;
        if self.events.is_empty() && !carried_over {
            self.dispatch(ChatEvent::Tick);
            return Ok(());
        }

        let mut listener_ready = self.backlog != Backlog::Drained;
        let mut ready: BTreeMap<ConnectionId, Readiness> = std::mem::take(&mut self.still_readable)
            .into_iter()
            .map(|conn_id| (conn_id, Readiness { readable: true, writable: false }))
            .collect();

        for event in &self.events {
            if event.token() == LISTENER {
                listener_ready = true;
                continue;
            }
            let r = ready.entry(ConnectionId::new(event.token().0)).or_default();
            // Errors and hangups surface through the read that follows
            r.readable |= event.is_readable() || event.is_read_closed() || event.is_error();
            r.writable |= event.is_writable();
        }

        if listener_ready {
            self.accept_pending();
        }

        for (conn_id, r) in ready {
            if r.writable {
                self.flush_peer(conn_id);
            }
            if r.readable {
                self.read_peer(conn_id);
            }
        }

        Ok(())
    }

    /// Accept pending connections, up to the per-cycle budget.
    fn accept_pending(&mut self) {
        let (accepted, backlog) = drain_backlog(|| self.transport.accept(), ACCEPT_BUDGET);
        self.backlog = backlog;

        for (stream, addr) in accepted {
            self.admit(stream, addr);
        }
    }

    /// Register an accepted socket, or close it if there is no room.
    fn admit(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let Some(conn_id) = self.driver.vacant_id() else {
            tracing::warn!(
                peer = %addr,
                capacity = self.driver.config().capacity,
                "registry full, rejecting connection"
            );
            return;
        };

        if let Err(e) = self.poll.registry().register(&mut stream, token(conn_id), Interest::READABLE)
        {
            tracing::warn!(peer = %addr, error = %e, "failed to register connection with poller");
            return;
        }

        let actions = match self.driver.process_event(ChatEvent::ConnectionAccepted { conn_id }) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "driver failed to register connection");
                self.deregister(&mut stream, conn_id);
                return;
            },
        };

        if actions.iter().any(|a| matches!(a, ChatAction::RejectConnection { .. })) {
            self.deregister(&mut stream, conn_id);
        } else {
            tracing::info!(%conn_id, peer = %addr, "Connected client");
            self.peers.insert(conn_id, Peer {
                stream,
                addr,
                outbound: OutboundQueue::new(self.config.outbound_limit),
                interest: Interest::READABLE,
            });
        }

        self.execute_actions(actions);
    }

    /// Read one chunk from a ready connection.
    ///
    /// The chunk becomes one relayed message. Readiness is edge-triggered, so
    /// a connection that returned data is remembered in `still_readable`
    /// until a read reports `WouldBlock`.
    fn read_peer(&mut self, conn_id: ConnectionId) {
        let result = loop {
            // The connection may have been destroyed earlier in this cycle
            let Some(peer) = self.peers.get_mut(&conn_id) else {
                return;
            };

            match peer.stream.read(&mut self.read_buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                other => break other,
            }
        };

        match result {
            Ok(0) => self.destroy(conn_id, CloseReason::EndOfStream),
            Ok(n) => {
                self.still_readable.insert(conn_id);
                let data = Bytes::copy_from_slice(&self.read_buf[..n]);
                self.dispatch(ChatEvent::DataReceived { conn_id, data });
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {},
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "read failed");
                self.destroy(conn_id, CloseReason::ReadError(e.kind()));
            },
        }
    }

    /// Flush a connection that became writable.
    fn flush_peer(&mut self, conn_id: ConnectionId) {
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.flush(self.poll.registry(), conn_id);
        }
    }

    /// Destroy a registered connection.
    fn destroy(&mut self, conn_id: ConnectionId, reason: CloseReason) {
        self.dispatch(ChatEvent::ConnectionClosed { conn_id, reason });
    }

    /// Feed an event to the driver and execute the resulting actions.
    fn dispatch(&mut self, event: ChatEvent) {
        match self.driver.process_event(event) {
            Ok(actions) => self.execute_actions(actions),
            Err(e) => tracing::warn!(error = %e, "event processing error"),
        }
    }

    /// Execute driver actions.
    fn execute_actions(&mut self, actions: Vec<ChatAction>) {
        let mut overflowed = Vec::new();

        for action in actions {
            match action {
                ChatAction::SendToConnection { conn_id, data } => {
                    self.queue_send(conn_id, data, &mut overflowed);
                },

                ChatAction::Broadcast { sender, message } => {
                    let recipients: Vec<ConnectionId> = self.driver.recipients(sender).collect();
                    for conn_id in recipients {
                        self.queue_send(conn_id, message.clone(), &mut overflowed);
                    }
                },

                ChatAction::CloseConnection { conn_id, reason } => {
                    self.still_readable.remove(&conn_id);
                    if let Some(mut peer) = self.peers.remove(&conn_id) {
                        self.deregister(&mut peer.stream, conn_id);
                        tracing::info!(%conn_id, peer = %peer.addr, %reason, "Disconnected client");
                    }
                },

                ChatAction::RejectConnection { conn_id, reason } => {
                    tracing::warn!(%conn_id, %reason, "rejected connection");
                },

                ChatAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }

        for conn_id in overflowed {
            self.destroy(conn_id, CloseReason::OutboundOverflow);
        }
    }

    /// Queue bytes for a connection and try to write them immediately.
    ///
    /// Under [`BroadcastPolicy::Disconnect`] a full queue records the
    /// connection in `overflowed`; it is destroyed after the current batch so
    /// an in-progress broadcast still reaches everyone else.
    fn queue_send(
        &mut self,
        conn_id: ConnectionId,
        data: Bytes,
        overflowed: &mut Vec<ConnectionId>,
    ) {
        let Some(peer) = self.peers.get_mut(&conn_id) else {
            tracing::debug!(%conn_id, "send to connection without socket");
            return;
        };

        if let Err(e) = peer.outbound.push(data) {
            match self.config.broadcast_policy {
                BroadcastPolicy::DropMessage => {
                    tracing::warn!(%conn_id, error = %e, "outbound queue full, dropping message");
                },
                BroadcastPolicy::Disconnect => {
                    tracing::warn!(%conn_id, error = %e, "outbound queue full, disconnecting");
                    if !overflowed.contains(&conn_id) {
                        overflowed.push(conn_id);
                    }
                },
            }
            return;
        }

        peer.flush(self.poll.registry(), conn_id);
    }

    fn deregister(&self, stream: &mut TcpStream, conn_id: ConnectionId) {
        if let Err(e) = self.poll.registry().deregister(stream) {
            tracing::debug!(%conn_id, error = %e, "failed to deregister socket");
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        self.driver.registry()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.driver.connection_count()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &ServerRuntimeConfig {
        &self.config
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("driver", &self.driver)
            .field("peer_count", &self.peers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, net::TcpStream as StdTcpStream, time::Instant};

    use super::*;

    fn test_config() -> ServerRuntimeConfig {
        ServerRuntimeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            poll_timeout: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Run cycles until `done` holds or a second passes.
    fn pump_until(server: &mut Server, done: impl Fn(&Server) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            server.run_cycle().unwrap();
            if done(server) {
                return true;
            }
        }
        false
    }

    fn connect(server: &Server) -> StdTcpStream {
        let stream = StdTcpStream::connect(server.local_addr().unwrap()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        stream
    }

    #[test]
    fn idle_cycle_times_out_cleanly() {
        let mut server = Server::bind(test_config()).unwrap();
        server.run_cycle().unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn bind_rejects_invalid_address() {
        let config =
            ServerRuntimeConfig { bind_address: "not an address".to_string(), ..test_config() };
        assert!(matches!(Server::bind(config), Err(ServerError::Config(_))));
    }

    #[test]
    fn accepted_client_is_registered_and_welcomed() {
        let mut server = Server::bind(test_config()).unwrap();
        let mut client = connect(&server);

        assert!(pump_until(&mut server, |s| s.connection_count() == 1));
        assert_eq!(server.registry().watermark(), Some(ConnectionId::new(0)));

        let mut welcome = [0u8; 21];
        client.read_exact(&mut welcome).unwrap();
        assert_eq!(&welcome, b"Welcome to the chat!\n");
    }

    #[test]
    fn closed_client_is_unregistered() {
        let mut server = Server::bind(test_config()).unwrap();
        let client = connect(&server);
        assert!(pump_until(&mut server, |s| s.connection_count() == 1));

        drop(client);

        assert!(pump_until(&mut server, |s| s.connection_count() == 0));
        assert_eq!(server.registry().watermark(), None);
    }

    #[test]
    fn chunk_is_relayed_to_other_client_only() {
        let mut server = Server::bind(test_config()).unwrap();
        let mut alice = connect(&server);
        assert!(pump_until(&mut server, |s| s.connection_count() == 1));
        let mut bob = connect(&server);
        assert!(pump_until(&mut server, |s| s.connection_count() == 2));

        let mut welcome = [0u8; 21];
        alice.read_exact(&mut welcome).unwrap();
        bob.read_exact(&mut welcome).unwrap();

        alice.write_all(b"hi\n").unwrap();
        pump_until(&mut server, |_| false);

        let mut line = [0u8; 11];
        bob.read_exact(&mut line).unwrap();
        assert_eq!(&line, b"user#0> hi\n");

        alice.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let mut buf = [0u8; 1];
        let err = alice.read(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut));
    }

    #[test]
    fn bind_rejects_capacity_beyond_maximum() {
        for capacity in [MAX_CAPACITY + 1, LISTENER.0, usize::MAX] {
            let config =
                ServerRuntimeConfig { driver: DriverConfig { capacity }, ..test_config() };
            assert!(matches!(Server::bind(config), Err(ServerError::Config(_))));
        }

        let config = ServerRuntimeConfig {
            driver: DriverConfig { capacity: MAX_CAPACITY },
            ..test_config()
        };
        assert!(Server::bind(config).is_ok());
    }

    #[test]
    fn one_chunk_is_read_per_cycle() {
        let mut server = Server::bind(test_config()).unwrap();
        let mut alice = connect(&server);
        assert!(pump_until(&mut server, |s| s.connection_count() == 1));
        let mut bob = connect(&server);
        assert!(pump_until(&mut server, |s| s.connection_count() == 2));

        let mut welcome = [0u8; 21];
        alice.read_exact(&mut welcome).unwrap();
        bob.read_exact(&mut welcome).unwrap();

        alice.write_all(&[b'a'; 600]).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        server.run_cycle().unwrap();
        assert!(server.still_readable.contains(&ConnectionId::new(0)));

        // Exactly one 256-byte chunk went out this cycle
        bob.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 1024];
        let n = bob.read(&mut buf).unwrap();
        assert_eq!(n, 8 + 256);
        assert!(buf[..8].starts_with(b"user#0> "));
        let err = bob.read(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut));

        // The rest follows on later cycles without a new readiness edge
        assert!(pump_until(&mut server, |s| s.still_readable.is_empty()));
        let mut rest = [0u8; 8 + 256 + 8 + 88];
        bob.read_exact(&mut rest).unwrap();
        assert_eq!(&rest[..8], b"user#0> ");
        assert_eq!(&rest[8 + 256..8 + 256 + 8], b"user#0> ");
    }

    #[test]
    fn driver_errors_are_logged_not_propagated() {
        let mut server = Server::bind(test_config()).unwrap();

        server.dispatch(ChatEvent::ConnectionClosed {
            conn_id: ConnectionId::new(7),
            reason: CloseReason::EndOfStream,
        });

        assert!(server.run_cycle().is_ok());
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn drain_backlog_stops_at_failure_and_reports_it() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut results = vec![
            Err(io::Error::other("too many open files")),
            Ok(Some((1, addr))),
        ];

        let (accepted, backlog) = drain_backlog(|| results.pop().unwrap(), ACCEPT_BUDGET);

        assert_eq!(accepted.len(), 1);
        assert_eq!(backlog, Backlog::Failed);
        assert!(results.is_empty());
    }

    #[test]
    fn drain_backlog_skips_transient_errors() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut results = vec![
            Ok(None),
            Ok(Some((2, addr))),
            Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
            Ok(Some((1, addr))),
        ];

        let (accepted, backlog) = drain_backlog(|| results.pop().unwrap(), ACCEPT_BUDGET);

        assert_eq!(accepted.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(backlog, Backlog::Drained);
    }

    #[test]
    fn drain_backlog_respects_budget() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let (accepted, backlog) = drain_backlog(|| Ok(Some(((), addr))), 4);

        assert_eq!(accepted.len(), 4);
        assert_eq!(backlog, Backlog::MorePending);
    }

    #[test]
    fn failed_accept_is_retried_without_new_readiness() {
        let mut server = Server::bind(test_config()).unwrap();
        let mut client = connect(&server);

        // Consume the listener's readiness edge without accepting, as a
        // failed accept pass would
        server.poll.poll(&mut server.events, Some(Duration::from_millis(200))).unwrap();
        assert!(server.events.iter().any(|e| e.token() == LISTENER));
        server.backlog = Backlog::Failed;

        server.run_cycle().unwrap();

        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.backlog, Backlog::Drained);
        let mut welcome = [0u8; 21];
        client.read_exact(&mut welcome).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pending_output_is_discarded_when_writability_cannot_be_watched() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = StdTcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.set_nonblocking(true).unwrap();

        // Never registered, so reregistering fails
        let poll = Poll::new().unwrap();
        let mut peer = Peer {
            stream: TcpStream::from_std(client),
            addr: listener.local_addr().unwrap(),
            outbound: OutboundQueue::new(64),
            interest: Interest::READABLE,
        };
        peer.outbound.push(Bytes::from_static(b"stuck")).unwrap();

        peer.watch_output(poll.registry(), ConnectionId::new(0), FlushStatus::Pending);

        assert!(peer.outbound.is_empty());
        assert_eq!(peer.interest, Interest::READABLE);
    }
}
