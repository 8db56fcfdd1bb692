//! Transport abstraction shared by the HTTP and gRPC listeners.
//!
//! # Lifecycle
//! ```text
//! Unbound ──bind──▶ Serving ──shutdown──▶ ShuttingDown ──drained──▶ Stopped
//!    └────────────────────shutdown before bind────────────────────────▲
//! ```
//!
//! # Design Decisions
//! - One instance per process run; a stopped transport is never restarted
//! - `start` = `bind` + `serve`; the supervisor calls them separately so a
//!   bind failure is fatal before anything is spawned
//! - `shutdown` never blocks past its deadline

pub mod control;

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::time::Instant;

pub use control::{DrainPolicy, ListenerControl};

/// Lifecycle state of a single transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unbound,
    Serving,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ListenerState::Unbound => "unbound",
            ListenerState::Serving => "serving",
            ListenerState::ShuttingDown => "shutting_down",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{transport} transport was already started")]
    AlreadyStarted { transport: &'static str },

    #[error("{transport} transport is not bound")]
    NotBound { transport: &'static str },

    #[error("{transport} transport failed to bind {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{transport} transport failed to accept connections: {source}")]
    Accept {
        transport: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{transport} transport stopped serving: {message}")]
    Serve {
        transport: &'static str,
        message: String,
    },

    #[error("{transport} transport failed to register services: {message}")]
    Registration {
        transport: &'static str,
        message: String,
    },

    #[error("{transport} transport did not drain before the shutdown deadline")]
    DrainTimeout { transport: &'static str },
}

/// A network listener with an independently managed lifecycle.
pub trait Transport: Send + Sync + 'static {
    /// Short name used in logs ("http", "grpc").
    fn name(&self) -> &'static str;

    /// Bind the listening socket. Returns the bound address.
    fn bind(&self) -> impl Future<Output = Result<SocketAddr, TransportError>> + Send;

    /// Serve until shut down. Returns `Ok(())` after a clean shutdown.
    fn serve(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop accepting, drain in-flight work, return by `deadline`.
    fn shutdown(&self, deadline: Instant)
        -> impl Future<Output = Result<(), TransportError>> + Send;

    fn state(&self) -> ListenerState;

    /// Bound address, once `bind` succeeded.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Bind and serve. Blocks until the transport stops.
    fn start(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            self.bind().await?;
            self.serve().await
        }
    }
}
