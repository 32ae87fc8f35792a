//! Byte-level wire contract.
//!
//! There is no framing. A client receives [`WELCOME_MESSAGE`] once on
//! connect, then one relay line per chunk read from any other client: the
//! sender's nickname, [`NICKNAME_SEPARATOR`], and exactly the bytes read. A
//! chunk is whatever one read returned, so a logical line may be split across
//! several relay lines or several lines may share one.

use bytes::{BufMut, Bytes, BytesMut};

use crate::connection::Nickname;

/// Written to every connection right after it is registered.
pub const WELCOME_MESSAGE: &[u8] = b"Welcome to the chat!\n";

/// Separator between the nickname and the relayed bytes.
pub const NICKNAME_SEPARATOR: &[u8] = b"> ";

/// Default maximum number of bytes read from a client per chunk.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;

/// Build the relay line for a chunk sent by `nickname`.
///
/// The payload is copied verbatim: no trimming, no terminator, no UTF-8
/// validation.
pub fn relay_line(nickname: &Nickname, payload: &[u8]) -> Bytes {
    let mut buf =
        BytesMut::with_capacity(nickname.as_bytes().len() + NICKNAME_SEPARATOR.len() + payload.len());
    buf.put_slice(nickname.as_bytes());
    buf.put_slice(NICKNAME_SEPARATOR);
    buf.put_slice(payload);
    buf.freeze()
}
