//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Transport bind
//!     → listener.rs (bind 0.0.0.0:port, classify accept errors)
//!     → connection.rs (connection ids, open count, idle tracking)
//!     → hand off to the HTTP or gRPC server
//! ```

pub mod connection;
pub mod listener;
