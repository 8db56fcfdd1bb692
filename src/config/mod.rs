//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! default.yaml (+ default.<env>.yaml overlay)
//!     → loader.rs (read, deep-merge, deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc with the supervisor and both transports
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod duration;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{Environment, GrpcConfig, HttpConfig, LoggingConfig, ServerConfig, ServiceConfig};
