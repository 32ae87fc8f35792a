//! Server error types.

use std::io;

use thiserror::Error;

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// Fatal: prevents server startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error (socket create/bind/listen failure, poller setup).
    ///
    /// Fatal at startup. The listener cannot be used.
    #[error("transport error: {0}")]
    Transport(String),

    /// The readiness wait itself failed (not a timeout).
    ///
    /// Fatal: the event loop cannot make progress without its poller.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
