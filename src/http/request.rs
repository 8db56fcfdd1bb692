//! Request correlation.
//!
//! Every request gets an `x-request-id`: the client's own when supplied,
//! otherwise a generated UUID v4. The id is echoed on the response.

use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Add the request id layers to `router`.
///
/// Call after adding the other layers: the id must be set before they run.
pub fn with_request_id(router: Router) -> Router {
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
