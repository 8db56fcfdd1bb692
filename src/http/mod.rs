//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (server.rs accept loop)
//!     → hyper-util auto builder (HTTP/1.1 or HTTP/2, header read timeout)
//!     → PanicGuardLayer (500 for a panicking request)
//!     → request.rs (x-request-id set + propagated)
//!     → TraceLayer → TimeoutLayer (408 past write_timeout)
//!     → Router from routes.rs registrars (health.rs first)
//! ```

pub mod health;
pub mod request;
pub mod routes;
pub mod server;

pub use health::HealthRoutes;
pub use request::X_REQUEST_ID;
pub use routes::RouteRegistrar;
pub use server::HttpTransport;
