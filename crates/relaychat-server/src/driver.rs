//! Relay driver.
//!
//! Owns the [`ConnectionRegistry`] and turns runtime events (accepted,
//! data, closed, tick) into actions (send, broadcast, close, log). It performs
//! no I/O; the runtime in `lib.rs` executes the actions against real sockets
//! and the harness drives it directly in tests.

use std::{fmt, io};

use bytes::Bytes;
use relaychat_core::{
    Connection, ConnectionId, ConnectionRegistry, DEFAULT_CAPACITY,
    wire::{WELCOME_MESSAGE, relay_line},
};

use crate::server_error::DriverError;

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum simultaneously registered connections
    pub capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY }
    }
}

/// Why a registered connection is being destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its end (read returned zero bytes)
    EndOfStream,
    /// Read failed with an I/O error
    ReadError(io::ErrorKind),
    /// Outbound queue overflowed under [`crate::BroadcastPolicy::Disconnect`]
    OutboundOverflow,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("end of stream"),
            Self::ReadError(kind) => write!(f, "read error: {kind}"),
            Self::OutboundOverflow => f.write_str("outbound queue overflow"),
        }
    }
}

/// Events that the driver processes.
///
/// These are produced by the event loop (or a test harness).
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A new connection was accepted and assigned an id
    ConnectionAccepted {
        /// Id chosen from [`ChatDriver::vacant_id`]
        conn_id: ConnectionId,
    },

    /// A chunk of bytes was read from a connection
    DataReceived {
        /// Connection that sent the chunk
        conn_id: ConnectionId,
        /// Exactly the bytes one read returned
        data: Bytes,
    },

    /// A connection must be destroyed
    ConnectionClosed {
        /// Connection to destroy
        conn_id: ConnectionId,
        /// Reason for closure
        reason: CloseReason,
    },

    /// Readiness wait timed out with no activity
    Tick,
}

/// Actions that the driver produces.
///
/// These are executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Send bytes to a single connection
    SendToConnection {
        /// Target connection
        conn_id: ConnectionId,
        /// Bytes to send
        data: Bytes,
    },

    /// Send a message to every registered connection except the sender
    Broadcast {
        /// Originating connection, excluded from delivery
        sender: ConnectionId,
        /// Fully formatted relay line
        message: Bytes,
    },

    /// Close a destroyed connection's socket
    CloseConnection {
        /// Connection to close
        conn_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Close a just-accepted socket that could not be registered
    RejectConnection {
        /// Id that was requested for the socket
        conn_id: ConnectionId,
        /// Reason for rejection
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for driver actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based relay driver.
///
/// Sole owner and mutator of the connection registry.
pub struct ChatDriver {
    /// Live connections
    registry: ConnectionRegistry,
    /// Driver configuration
    config: DriverConfig,
}

impl ChatDriver {
    /// Create a new driver with an empty registry.
    pub fn new(config: DriverConfig) -> Self {
        Self { registry: ConnectionRegistry::new(config.capacity), config }
    }

    /// Process an event and return actions to execute.
    ///
    /// This is the main entry point for the driver.
    pub fn process_event(&mut self, event: ChatEvent) -> Result<Vec<ChatAction>, DriverError> {
        match event {
            ChatEvent::ConnectionAccepted { conn_id } => {
                Ok(self.handle_connection_accepted(conn_id))
            },
            ChatEvent::DataReceived { conn_id, data } => self.handle_data_received(conn_id, &data),
            ChatEvent::ConnectionClosed { conn_id, reason } => {
                self.handle_connection_closed(conn_id, &reason)
            },
            ChatEvent::Tick => Ok(Vec::new()),
        }
    }

    /// Register a new connection and greet it.
    ///
    /// A registry rejection is not an error: the socket is closed and the
    /// relay carries on.
    fn handle_connection_accepted(&mut self, conn_id: ConnectionId) -> Vec<ChatAction> {
        match self.registry.register(conn_id) {
            Ok(conn) => vec![
                ChatAction::Log {
                    level: LogLevel::Debug,
                    message: format!("connection {conn_id} registered as {}", conn.nickname()),
                },
                ChatAction::SendToConnection { conn_id, data: Bytes::from_static(WELCOME_MESSAGE) },
            ],
            Err(e) => vec![ChatAction::RejectConnection { conn_id, reason: e.to_string() }],
        }
    }

    /// Turn a chunk into a relay line for everyone but the sender.
    fn handle_data_received(
        &mut self,
        conn_id: ConnectionId,
        data: &[u8],
    ) -> Result<Vec<ChatAction>, DriverError> {
        let conn = self.registry.lookup(conn_id).ok_or(DriverError::ConnectionNotFound(conn_id))?;
        let message = relay_line(conn.nickname(), data);

        Ok(vec![
            ChatAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "{}> {}",
                    conn.nickname(),
                    String::from_utf8_lossy(data).trim_end_matches(['\r', '\n'])
                ),
            },
            ChatAction::Broadcast { sender: conn_id, message },
        ])
    }

    /// Destroy a connection.
    fn handle_connection_closed(
        &mut self,
        conn_id: ConnectionId,
        reason: &CloseReason,
    ) -> Result<Vec<ChatAction>, DriverError> {
        let conn =
            self.registry.unregister(conn_id).ok_or(DriverError::ConnectionNotFound(conn_id))?;

        Ok(vec![
            ChatAction::CloseConnection { conn_id, reason: reason.to_string() },
            ChatAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "{} unregistered, {} connections remain",
                    conn.nickname(),
                    self.registry.count()
                ),
            },
        ])
    }

    /// Ids a broadcast from `sender` is delivered to, ascending.
    pub fn recipients(&self, sender: ConnectionId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.registry.others_than(sender).map(Connection::id)
    }

    /// Lowest id available for the next accepted connection. `None` when the
    /// registry is full.
    pub fn vacant_id(&self) -> Option<ConnectionId> {
        self.registry.vacant_id()
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl fmt::Debug for ChatDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatDriver")
            .field("connection_count", &self.registry.count())
            .field("watermark", &self.registry.watermark())
            .field("capacity", &self.config.capacity)
            .finish()
    }
}
