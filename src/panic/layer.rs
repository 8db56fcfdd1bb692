//! Tower layer applying the panic guard to every call of a service.
//!
//! The same layer type guards the HTTP router and the gRPC server; only the
//! [`Rescue`] strategy that builds the caller-facing error differs.

use std::task::{Context, Poll};

use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::panic::{guard, guard_sync, PanicError};

/// Builds the response sent to a caller whose request panicked.
pub trait Rescue<B>: Clone + Send + Sync + 'static {
    fn rescue(&self, error: &PanicError) -> Response<B>;
}

/// Plain `500 Internal Server Error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpRescue;

impl Rescue<axum::body::Body> for HttpRescue {
    fn rescue(&self, _error: &PanicError) -> Response<axum::body::Body> {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// gRPC `INTERNAL` status carried in trailers-only form.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcRescue;

impl Rescue<tonic::body::Body> for GrpcRescue {
    fn rescue(&self, _error: &PanicError) -> Response<tonic::body::Body> {
        let mut response = Response::new(tonic::body::Body::default());
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
        headers.insert("grpc-status", HeaderValue::from(tonic::Code::Internal as i32));
        headers.insert(
            "grpc-message",
            HeaderValue::from_static("Internal%20server%20error"),
        );
        response
    }
}

/// Layer that wraps services in [`PanicGuardService`].
#[derive(Debug, Clone)]
pub struct PanicGuardLayer<R> {
    boundary: &'static str,
    rescue: R,
}

impl<R> PanicGuardLayer<R> {
    pub fn new(boundary: &'static str, rescue: R) -> Self {
        Self { boundary, rescue }
    }
}

impl PanicGuardLayer<HttpRescue> {
    pub fn http() -> Self {
        Self::new("http-handler", HttpRescue)
    }
}

impl PanicGuardLayer<GrpcRescue> {
    pub fn grpc() -> Self {
        Self::new("grpc-handler", GrpcRescue)
    }
}

impl<S, R: Clone> Layer<S> for PanicGuardLayer<R> {
    type Service = PanicGuardService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicGuardService {
            inner,
            boundary: self.boundary,
            rescue: self.rescue.clone(),
        }
    }
}

/// Service converting a panic in the inner service into a rescue response.
#[derive(Debug, Clone)]
pub struct PanicGuardService<S, R> {
    inner: S,
    boundary: &'static str,
    rescue: R,
}

impl<S, R, ReqBody, ResBody> Service<Request<ReqBody>> for PanicGuardService<S, R>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
    R: Rescue<ResBody>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response<ResBody>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let boundary = self.boundary;
        let rescue = self.rescue.clone();

        // Handlers may panic while building their future, not only while it runs.
        let inner = &mut self.inner;
        let future = match guard_sync(boundary, move || inner.call(request)) {
            Ok(future) => future,
            Err(error) => {
                let response = rescue.rescue(&error);
                return Box::pin(async move { Ok(response) });
            }
        };

        Box::pin(async move {
            match guard(boundary, future).await {
                Ok(result) => result,
                Err(error) => Ok(rescue.rescue(&error)),
            }
        })
    }
}
