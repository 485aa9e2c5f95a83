//! # Queue Broker
//!
//! An in-memory, multi-queue message broker that speaks a small
//! line-oriented protocol over TCP. Each named queue is a strict FIFO;
//! queues are created implicitly on first use and live for the lifetime of
//! the process.

pub mod cli;
pub mod connection;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use cli::Args;
pub use connection::Connection;
pub use protocol::{BrokerError, ProtocolError};
pub use queue::{Message, QueueBody};
pub use registry::QueueRegistry;
pub use shutdown::Shutdown;

/// The current version of the broker, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values.
pub mod defaults {
    /// Default TCP port the broker listens on.
    pub const PORT: u16 = 7878;

    /// Default bind address: all interfaces.
    pub const HOST: &str = "0.0.0.0";
}
