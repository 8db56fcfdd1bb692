//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor::start (supervisor.rs):
//!     Bind HTTP + gRPC → spawn one guarded task per listener → Serving
//!
//! Triggers:
//!     listener error (mpsc, capacity 2)
//!     SIGINT / SIGTERM (signals.rs)
//!     caller cancellation (shutdown.rs)
//!
//! Shutdown:
//!     first trigger → one shared deadline → HTTP drain → gRPC drain → Stopped
//! ```
//!
//! # Design Decisions
//! - Bind failures are fatal before anything is spawned
//! - Shutdown runs once; later triggers are ignored
//! - Shutdown errors are logged, never propagated

pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use supervisor::{Supervisor, SupervisorError, SupervisorState, TerminationTrigger};
