//! Test harness for the relaychat server.
//!
//! Real sockets on loopback, driven two ways:
//!
//! - [`SteppedServer`] runs readiness cycles only when a test asks for them,
//!   so tests can inspect the connection registry between steps.
//! - [`TestServer`] runs the production loop on its own thread, exactly as
//!   the binary does.
//!
//! [`TestClient`] is a plain blocking client with read helpers that never
//! hang a test forever. Payloads come from [`seeded_payload`] so failures
//! reproduce from the seed alone.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod payload;
pub mod stepped_server;
pub mod test_client;
pub mod test_server;

pub use payload::seeded_payload;
pub use stepped_server::{SteppedServer, loopback_config};
pub use test_client::TestClient;
pub use test_server::TestServer;
