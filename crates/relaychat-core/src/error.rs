//! Error types for the relaychat core.
//!
//! Registry errors are rejections: the registry is left untouched and the
//! caller decides what to do with the offending connection. None of them are
//! fatal to the relay as a whole.

use thiserror::Error;

use crate::connection::ConnectionId;

/// Errors returned by [`crate::ConnectionRegistry`] mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id lies outside the configured capacity range.
    #[error("connection {id} exceeds registry capacity {capacity}")]
    CapacityExceeded {
        /// Id that was rejected
        id: ConnectionId,
        /// Configured capacity of the registry
        capacity: usize,
    },

    /// The id is already bound to a live connection.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}

/// Errors from constructing a [`crate::Nickname`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NicknameError {
    /// Nickname was empty
    #[error("nickname must not be empty")]
    Empty,

    /// Nickname longer than [`crate::NICKNAME_MAX_LEN`] bytes
    #[error("nickname is {len} bytes, limit is {max}")]
    TooLong {
        /// Length of the rejected nickname in bytes
        len: usize,
        /// Maximum permitted length
        max: usize,
    },
}
