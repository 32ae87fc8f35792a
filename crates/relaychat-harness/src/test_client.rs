//! Blocking chat client for tests.
//!
//! Every read is bounded by a timeout so a missing message fails the test
//! instead of hanging it.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::{Duration, Instant},
};

use relaychat_core::wire::WELCOME_MESSAGE;

/// Default bound on a single blocking read.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Test client over a real TCP connection.
#[derive(Debug)]
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connect to a relay server.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(Self { stream })
    }

    /// Send raw bytes.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read the greeting and check it is the welcome message.
    pub fn read_welcome(&mut self) -> io::Result<()> {
        let greeting = self.read_bytes(WELCOME_MESSAGE.len())?;
        if greeting != WELCOME_MESSAGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected greeting: {:?}", String::from_utf8_lossy(&greeting)),
            ));
        }
        Ok(())
    }

    /// Collect whatever arrives until the connection stays quiet for
    /// `window`.
    ///
    /// Returns the bytes received, possibly none. End of stream also ends
    /// the collection.
    pub fn pending_bytes(&mut self, window: Duration) -> io::Result<Vec<u8>> {
        self.stream.set_read_timeout(Some(window))?;
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];

        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if is_timeout(&e) => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => break Err(e),
            }
        };

        self.stream.set_read_timeout(Some(READ_TIMEOUT))?;
        result.map(|()| received)
    }

    /// Read until the server closes the connection.
    ///
    /// Returns everything received before the close. Fails with `TimedOut`
    /// if the connection is still open after `timeout`. A reset counts as a
    /// close.
    pub fn read_until_closed(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "connection still open"));
            }
            self.stream.set_read_timeout(Some(remaining))?;

            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(received),
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return Ok(received),
                Err(e) if is_timeout(&e) => {},
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
    }

    /// Close the write half, which the server reads as end of stream.
    pub fn shutdown_write(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    /// Local address of this client's socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Clone the underlying stream, e.g. to write from another thread.
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }
}
