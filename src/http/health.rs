//! Liveness endpoint.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::http::routes::RouteRegistrar;

/// Body returned by `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Registers `GET /health`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthRoutes;

impl RouteRegistrar for HealthRoutes {
    fn register_routes(&self, router: Router) -> Router {
        router.route("/health", get(health_check))
    }
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}
