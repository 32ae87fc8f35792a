//! Driver error types.
//!
//! These surface logic errors from the Sans-IO driver: an event that refers
//! to a connection the driver does not know about. The runtime logs them and
//! keeps going; none of them stop the relay.

use relaychat_core::ConnectionId;
use thiserror::Error;

/// Errors that can occur while the driver processes an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Connection not found in registry.
    ///
    /// Occurs when data or a close arrives for an id that was never
    /// registered or was already destroyed. Destroying a connection twice
    /// lands here.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),
}
