//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs (subscriber: level filter + json/text formatter)
//!
//! HTTP requests additionally get:
//!     → tower-http TraceLayer spans
//!     → x-request-id correlation header
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - One subscriber, installed once by the binary before anything logs

pub mod logging;
