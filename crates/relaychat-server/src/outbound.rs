//! Per-connection outbound queue.
//!
//! Sockets are non-blocking, so a write may accept only part of a message or
//! none of it. Whatever the kernel does not take is queued here and flushed
//! when the socket reports writable. The queue is bounded: a reader that
//! stops draining its socket cannot stall the event loop, and what happens to
//! its traffic instead is decided by the [`BroadcastPolicy`].

use std::{collections::VecDeque, io};

use bytes::{Buf, Bytes};
use thiserror::Error;

/// Default outbound queue limit per connection, in bytes.
pub const DEFAULT_OUTBOUND_LIMIT: usize = 64 * 1024;

/// Policy for a recipient whose outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    /// Skip the message for that recipient and keep the connection.
    #[default]
    DropMessage,

    /// Destroy the recipient once the current broadcast finishes.
    Disconnect,
}

/// Queue has no room for a message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("outbound queue full: {queued} bytes queued, {incoming} incoming, limit {limit}")]
pub struct QueueFull {
    /// Bytes already waiting
    pub queued: usize,
    /// Size of the rejected message
    pub incoming: usize,
    /// Configured limit
    pub limit: usize,
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything was written
    Drained,
    /// The writer would block with bytes still queued
    Pending,
}

/// Bounded FIFO of byte chunks waiting to be written.
#[derive(Debug)]
pub struct OutboundQueue {
    chunks: VecDeque<Bytes>,
    queued: usize,
    limit: usize,
}

impl OutboundQueue {
    /// Create an empty queue holding at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self { chunks: VecDeque::new(), queued: 0, limit }
    }

    /// Append a whole message, or reject it if it does not fit.
    ///
    /// Messages are never split: either all of `data` is queued or none.
    pub fn push(&mut self, data: Bytes) -> Result<(), QueueFull> {
        if self.queued + data.len() > self.limit {
            return Err(QueueFull { queued: self.queued, incoming: data.len(), limit: self.limit });
        }

        if !data.is_empty() {
            self.queued += data.len();
            self.chunks.push_back(data);
        }
        Ok(())
    }

    /// Write queued bytes until drained or the writer would block.
    ///
    /// Partially written chunks keep their unwritten tail at the front.
    pub fn flush<W: io::Write>(&mut self, writer: &mut W) -> io::Result<FlushStatus> {
        while let Some(front) = self.chunks.front_mut() {
            match writer.write(&front[..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.queued -= n;
                    if n == front.len() {
                        self.chunks.pop_front();
                    } else {
                        front.advance(n);
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(FlushStatus::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }

        Ok(FlushStatus::Drained)
    }

    /// Discard everything queued.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.queued = 0;
    }

    /// Number of bytes waiting to be written.
    pub fn len(&self) -> usize {
        self.queued
    }

    /// Nothing is waiting to be written.
    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    /// Configured limit in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }
}
