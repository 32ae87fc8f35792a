//! Core state for the relaychat TCP relay.
//!
//! This crate holds everything that does not touch a socket: the connection
//! registry, the per-connection identity types, and the byte-level wire
//! contract. The server crate drives these from its readiness loop.
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: bounded id -> [`Connection`] table with count and
//!   watermark tracking
//! - [`ConnectionId`] / [`Nickname`]: identity of one accepted client
//! - [`wire`]: welcome message and relay line formatting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod registry;
pub mod wire;

pub use connection::{Connection, ConnectionId, NICKNAME_MAX_LEN, Nickname};
pub use error::{NicknameError, RegistryError};
pub use registry::{ConnectionRegistry, DEFAULT_CAPACITY};
