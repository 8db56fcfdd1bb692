//! TCP listener binding and accept error classification.
//!
//! # Responsibilities
//! - Bind a transport's port on all interfaces
//! - Tell per-connection accept failures apart from listener failures

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;

use crate::transport::TransportError;

/// Bind `0.0.0.0:port` for the named transport.
pub async fn bind(transport: &'static str, port: u16) -> Result<TcpListener, TransportError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            transport,
            addr,
            source,
        })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| TransportError::Bind {
            transport,
            addr,
            source,
        })?;

    tracing::info!(transport, address = %local_addr, "Listener bound");

    Ok(listener)
}

/// Whether an accept error only concerns the connection being accepted.
///
/// These are retried; anything else means the listener itself is broken.
pub fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
