//! Unified error type.

use std::net::SocketAddr;
use std::time::Duration;

use crate::server::ServerState;

/// The error type returned by waypost's fallible operations.
///
/// A fault inside a handler is not an `Error`: it is a panic, contained by
/// [`Recovery`](crate::middleware::Recovery) and answered with a 500. This
/// type covers request validation and the server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The correlation header is missing or blank after trimming.
    #[error("header `{0}` is not provided or empty")]
    InvalidHeader(&'static str),

    /// The listening socket could not be created.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// In-flight connections outlived the grace period and were closed.
    #[error("graceful shutdown exceeded {0:?}; remaining connections were closed")]
    ShutdownTimeout(Duration),

    /// A lifecycle operation was called in a state that does not allow it.
    #[error("cannot {operation} a server that is {state}")]
    IllegalState {
        operation: &'static str,
        state: ServerState,
    },

    /// The OS signal handler could not be installed.
    #[error("signal: {0}")]
    Signal(#[source] std::io::Error),

    /// The accept loop task panicked or was cancelled.
    #[error("accept loop: {0}")]
    Join(#[from] tokio::task::JoinError),
}
