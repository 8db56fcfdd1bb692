//! Route registration seam.
//!
//! Handler modules implement [`RouteRegistrar`]; the HTTP transport calls
//! each registrar once while building its router.

use std::sync::Arc;

use axum::Router;

/// Something that contributes routes to the HTTP transport.
pub trait RouteRegistrar: Send + Sync {
    fn register_routes(&self, router: Router) -> Router;
}

impl<F> RouteRegistrar for F
where
    F: Fn(Router) -> Router + Send + Sync,
{
    fn register_routes(&self, router: Router) -> Router {
        self(router)
    }
}

/// Apply every registrar in order.
pub fn build_routes(registrars: &[Arc<dyn RouteRegistrar>]) -> Router {
    registrars
        .iter()
        .fold(Router::new(), |router, registrar| registrar.register_routes(router))
}
