//! relaychat server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on every interface, port 8080
//! relaychat-server
//!
//! # Small room on loopback, disconnect readers that fall behind
//! relaychat-server --bind 127.0.0.1:9000 --max-connections 16 --overflow-policy disconnect
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};
use relaychat_server::{
    BroadcastPolicy, DEFAULT_OUTBOUND_LIMIT, DriverConfig, Server, ServerRuntimeConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// What to do with a client whose outbound queue is full
#[derive(ValueEnum, Debug, Clone, Copy)]
enum OverflowPolicy {
    /// Skip the message for that client
    DropMessage,
    /// Disconnect the client
    Disconnect,
}

impl From<OverflowPolicy> for BroadcastPolicy {
    fn from(policy: OverflowPolicy) -> Self {
        match policy {
            OverflowPolicy::DropMessage => Self::DropMessage,
            OverflowPolicy::Disconnect => Self::Disconnect,
        }
    }
}

/// TCP chat relay server
#[derive(Parser, Debug)]
#[command(name = "relaychat-server")]
#[command(about = "Relays every client's messages to every other client")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Listen backlog
    #[arg(long, default_value = "512")]
    backlog: u32,

    /// Maximum concurrent connections (at most 1048576)
    #[arg(long, default_value = "1000")]
    max_connections: usize,

    /// Maximum bytes read (and relayed) per chunk
    #[arg(long, default_value = "256")]
    read_chunk_size: usize,

    /// Readiness wait timeout in milliseconds
    #[arg(long, default_value = "1000")]
    poll_timeout_ms: u64,

    /// Outbound queue limit per client, in bytes
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_LIMIT)]
    outbound_limit: usize,

    /// Policy for clients that cannot keep up
    #[arg(long, value_enum, default_value = "drop-message")]
    overflow_policy: OverflowPolicy,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if args.read_chunk_size == 0 {
        return Err("--read-chunk-size must be at least 1".into());
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        backlog: args.backlog,
        read_chunk_size: args.read_chunk_size,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
        outbound_limit: args.outbound_limit,
        broadcast_policy: args.overflow_policy.into(),
        driver: DriverConfig { capacity: args.max_connections },
    };

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return Err(e.into());
        },
    };

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "server stopped");
        return Err(e.into());
    }

    Ok(())
}
