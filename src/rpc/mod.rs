//! gRPC subsystem.
//!
//! # Data Flow
//! ```text
//! Registrars (common.rs + caller-supplied)
//!     → registry.rs (route table, reflection if the capabilities allow it)
//!     → server.rs (panic guard layer → tonic server → TCP listener)
//! ```

pub mod common;
pub mod errors;
pub mod registry;
pub mod server;

pub use registry::{Capabilities, ServiceRegistrar};
pub use server::RpcTransport;
