//! Dual-transport service supervisor.
//!
//! Runs an HTTP listener and a gRPC listener under one lifecycle: both are
//! bound up front, served on their own tasks, and shut down together within
//! one deadline once a signal, a listener failure, or the caller asks.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────── Supervisor ────────────────────────┐
//!                 │                                                            │
//!   HTTP client ──┼─▶ http::HttpTransport ──▶ PanicGuard ─▶ Router (health, …) │
//!                 │                                                            │
//!   gRPC client ──┼─▶ rpc::RpcTransport ────▶ PanicGuard ─▶ CommonService, …   │
//!                 │                                      (+ reflection in dev) │
//!                 │                                                            │
//!                 │   triggers: listener error │ SIGINT/SIGTERM │ Shutdown     │
//!                 │        └──────────────▶ shutdown(deadline) ◀───────┘       │
//!                 └────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod net;
pub mod rpc;
pub mod transport;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod panic;

pub use config::ServiceConfig;
pub use http::HttpTransport;
pub use lifecycle::{Shutdown, Supervisor};
pub use rpc::RpcTransport;
pub use transport::{ListenerState, Transport, TransportError};
