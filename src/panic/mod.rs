//! Panic recovery at task and request boundaries.
//!
//! # Data Flow
//! ```text
//! unit of work (future / closure / tower service call)
//!     → guard() / guard_sync() / PanicGuardLayer
//!         ok    → output passed through unchanged
//!         panic → hook.rs records location + backtrace at the panic site
//!               → error log with boundary, message, location, backtrace
//!               → Err(PanicError) or a rescue response for that one caller
//! ```
//!
//! # Boundaries
//! - every HTTP request (`PanicGuardLayer<HttpRescue>`)
//! - every gRPC call, unary and streaming (`PanicGuardLayer<GrpcRescue>`)
//! - each listener task body and the process entry point (`guard`)

pub mod hook;
pub mod layer;

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures_util::future::{poll_fn, FutureExt};
use thiserror::Error;

pub use hook::install_hook;
pub use layer::{GrpcRescue, HttpRescue, PanicGuardLayer, PanicGuardService, Rescue};

use hook::GuardScope;

/// A panic that was caught at a guard boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("panic in {boundary}: {message}")]
pub struct PanicError {
    /// Name of the boundary that caught the panic.
    pub boundary: &'static str,
    /// Panic payload rendered as text.
    pub message: String,
}

/// Run `future`, converting a panic into `Err(PanicError)`.
pub async fn guard<F>(boundary: &'static str, future: F) -> Result<F::Output, PanicError>
where
    F: Future,
{
    hook::install_hook();

    let mut future = std::pin::pin!(future);
    let scoped = poll_fn(|cx| {
        let _scope = GuardScope::enter();
        future.as_mut().poll(cx)
    });

    match AssertUnwindSafe(scoped).catch_unwind().await {
        Ok(output) => Ok(output),
        Err(payload) => Err(recovered(boundary, payload)),
    }
}

/// Run `f`, converting a panic into `Err(PanicError)`.
pub fn guard_sync<T>(boundary: &'static str, f: impl FnOnce() -> T) -> Result<T, PanicError> {
    hook::install_hook();

    let result = {
        let _scope = GuardScope::enter();
        panic::catch_unwind(AssertUnwindSafe(f))
    };
    result.map_err(|payload| recovered(boundary, payload))
}

fn recovered(boundary: &'static str, payload: Box<dyn Any + Send>) -> PanicError {
    let message = payload_message(payload.as_ref());
    let report = hook::take_report().unwrap_or_default();

    tracing::error!(
        boundary,
        panic = %message,
        location = report.location.as_deref().unwrap_or("unknown"),
        backtrace = %report.backtrace,
        "Recovered from panic"
    );

    PanicError { boundary, message }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
