//! `common` protobuf package: messages, the `CommonService` server and client.
//!
//! Laid out the way tonic's code generator would emit it, written by hand so
//! the build needs no `protoc`. The matching descriptor for reflection lives
//! in [`file_descriptor`].

use std::sync::Arc;
use std::task::{Context, Poll};

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MethodDescriptorProto,
    ServiceDescriptorProto,
};
use tonic::codegen::{http, Body, BoxFuture, Bytes, Service, StdError};

use crate::rpc::registry::ServiceRegistrar;

pub const PACKAGE: &str = "common";
pub const SERVICE_NAME: &str = "common.CommonService";
const HEALTH_CHECK_PATH: &str = "/common.CommonService/HealthCheck";

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct HealthCheckRequest {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct HealthCheckResponse {
    #[prost(bool, tag = "1")]
    pub status: bool,
}

/// Error details embedded in result messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// Server-side behavior of `common.CommonService`.
#[tonic::async_trait]
pub trait CommonService: Send + Sync + 'static {
    async fn health_check(
        &self,
        request: tonic::Request<HealthCheckRequest>,
    ) -> Result<tonic::Response<HealthCheckResponse>, tonic::Status>;
}

/// Default handler: always healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonServiceHandler;

#[tonic::async_trait]
impl CommonService for CommonServiceHandler {
    async fn health_check(
        &self,
        _request: tonic::Request<HealthCheckRequest>,
    ) -> Result<tonic::Response<HealthCheckResponse>, tonic::Status> {
        Ok(tonic::Response::new(HealthCheckResponse { status: true }))
    }
}

impl ServiceRegistrar for CommonServiceHandler {
    fn register_services(&self, routes: &mut tonic::service::RoutesBuilder) {
        routes.add_service(CommonServiceServer::new(*self));
    }

    fn file_descriptors(&self) -> Vec<FileDescriptorProto> {
        vec![file_descriptor()]
    }
}

/// Routes gRPC requests to a [`CommonService`] implementation.
#[derive(Debug)]
pub struct CommonServiceServer<T> {
    inner: Arc<T>,
}

impl<T> CommonServiceServer<T> {
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T> Clone for CommonServiceServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> tonic::server::NamedService for CommonServiceServer<T> {
    const NAME: &'static str = SERVICE_NAME;
}

impl<T, B> Service<http::Request<B>> for CommonServiceServer<T>
where
    T: CommonService,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            HEALTH_CHECK_PATH => {
                struct HealthCheckSvc<T: CommonService>(Arc<T>);

                impl<T: CommonService> tonic::server::UnaryService<HealthCheckRequest> for HealthCheckSvc<T> {
                    type Response = HealthCheckResponse;
                    type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;

                    fn call(&mut self, request: tonic::Request<HealthCheckRequest>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.health_check(request).await })
                    }
                }

                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let method = HealthCheckSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(method, req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

/// Trailers-only `UNIMPLEMENTED` response for unknown methods.
pub(crate) fn unimplemented_response() -> http::Response<tonic::body::Body> {
    let mut response = http::Response::new(tonic::body::Body::default());
    let headers = response.headers_mut();
    headers.insert(
        tonic::Status::GRPC_STATUS,
        (tonic::Code::Unimplemented as i32).into(),
    );
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/grpc"),
    );
    response
}

/// Client for `common.CommonService`.
#[derive(Debug, Clone)]
pub struct CommonServiceClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl CommonServiceClient<tonic::transport::Channel> {
    /// Connect to `dst`, e.g. `"http://127.0.0.1:8086"`.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<tonic::transport::Endpoint>,
        D::Error: Into<StdError>,
    {
        let channel = tonic::transport::Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(channel))
    }
}

impl<T> CommonServiceClient<T>
where
    T: tonic::client::GrpcService<tonic::body::Body>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    pub fn new(inner: T) -> Self {
        Self {
            inner: tonic::client::Grpc::new(inner),
        }
    }

    pub async fn health_check(
        &mut self,
        request: impl tonic::IntoRequest<HealthCheckRequest>,
    ) -> Result<tonic::Response<HealthCheckResponse>, tonic::Status> {
        self.unary(request.into_request(), HEALTH_CHECK_PATH).await
    }

    /// Issue a unary call with `common` messages to an arbitrary method path.
    pub async fn unary<Req, Res>(
        &mut self,
        request: tonic::Request<Req>,
        path: &'static str,
    ) -> Result<tonic::Response<Res>, tonic::Status>
    where
        Req: ::prost::Message + Send + Sync + 'static,
        Res: ::prost::Message + Default + Send + Sync + 'static,
    {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
        })?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(path);
        self.inner.unary(request, path, codec).await
    }
}

/// Descriptor of `common/common.proto`, used by the reflection service.
pub fn file_descriptor() -> FileDescriptorProto {
    let message = |name: &str, fields: Vec<FieldDescriptorProto>| DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    };
    let field = |name: &str, number: i32, kind: Type| FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(kind as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    };

    FileDescriptorProto {
        name: Some("common/common.proto".to_string()),
        package: Some(PACKAGE.to_string()),
        message_type: vec![
            message("HealthCheckRequest", vec![]),
            message("HealthCheckResponse", vec![field("status", 1, Type::Bool)]),
            message(
                "Error",
                vec![field("code", 1, Type::Int32), field("message", 2, Type::String)],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("CommonService".to_string()),
            method: vec![MethodDescriptorProto {
                name: Some("HealthCheck".to_string()),
                input_type: Some(".common.HealthCheckRequest".to_string()),
                output_type: Some(".common.HealthCheckResponse".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}
