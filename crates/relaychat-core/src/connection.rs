//! Identity of a single accepted client.
//!
//! A [`ConnectionId`] is allocated by the registry, not taken from the OS
//! descriptor, so it is always inside the registry's capacity range. Ids are
//! reused once the connection holding them is destroyed.

use std::fmt;

use crate::error::NicknameError;

/// Maximum nickname length in bytes.
pub const NICKNAME_MAX_LEN: usize = 31;

/// Opaque identifier for a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    /// Wrap a raw slot index.
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw slot index.
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name attached to every relayed line.
///
/// Bounded to [`NICKNAME_MAX_LEN`] bytes and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nickname(String);

impl Nickname {
    /// Validate and wrap a nickname.
    pub fn new(name: impl Into<String>) -> Result<Self, NicknameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NicknameError::Empty);
        }
        if name.len() > NICKNAME_MAX_LEN {
            return Err(NicknameError::TooLong { len: name.len(), max: NICKNAME_MAX_LEN });
        }
        Ok(Self(name))
    }

    /// Default nickname for a connection: `user#<id>`.
    ///
    /// The longest possible id (`usize::MAX`, 20 digits) still fits the bound,
    /// so this never fails.
    pub fn for_connection(id: ConnectionId) -> Self {
        Self(format!("user#{id}"))
    }

    /// Nickname as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nickname as raw bytes, as written on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One accepted client, as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    nickname: Nickname,
}

impl Connection {
    /// Create a connection with its default nickname.
    pub fn new(id: ConnectionId) -> Self {
        Self { id, nickname: Nickname::for_connection(id) }
    }

    /// Registry id of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Nickname prefixed to everything this connection sends.
    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }
}
