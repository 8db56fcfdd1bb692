//! End-to-end lifecycle tests for the supervisor.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tonic::codegen::{http, BoxFuture, Service};
use tonic::service::RoutesBuilder;
use voidkit::config::{load_config, Environment};
use voidkit::http::RouteRegistrar;
use voidkit::lifecycle::{Shutdown, Supervisor, SupervisorError, SupervisorState};
use voidkit::rpc::common::{HealthCheckRequest, HealthCheckResponse};
use voidkit::rpc::ServiceRegistrar;
use voidkit::{ListenerState, TransportError};

mod common;

async fn explode() -> &'static str {
    panic!("handler exploded")
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(10)).await;
    "finished"
}

fn test_routes() -> Arc<dyn RouteRegistrar> {
    Arc::new(|router: Router| {
        router
            .route("/explode", get(explode))
            .route("/slow", get(slow))
    })
}

/// gRPC service whose every method panics.
#[derive(Clone)]
struct ExplodingService;

impl tonic::server::NamedService for ExplodingService {
    const NAME: &'static str = "test.Exploding";
}

impl<B: Send + 'static> Service<http::Request<B>> for ExplodingService {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: http::Request<B>) -> Self::Future {
        Box::pin(async move { panic!("rpc method exploded") })
    }
}

struct ExplodingRegistrar;

impl ServiceRegistrar for ExplodingRegistrar {
    fn register_services(&self, routes: &mut RoutesBuilder) {
        routes.add_service(ExplodingService);
    }
}

fn supervisor(shutdown_timeout: Duration) -> Arc<Supervisor> {
    Arc::new(
        Supervisor::new(Arc::new(common::test_config(shutdown_timeout)))
            .with_routes(test_routes())
            .with_services(Arc::new(ExplodingRegistrar)),
    )
}

#[tokio::test]
async fn test_both_transports_serve_while_start_blocks() {
    let supervisor = supervisor(Duration::from_secs(5));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let response = common::client()
        .get(common::http_url(&supervisor, "/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));

    let mut grpc = common::grpc_client(&supervisor).await;
    let health = grpc.health_check(HealthCheckRequest {}).await.unwrap();
    assert!(health.into_inner().status);

    assert!(!task.is_finished());
    assert_eq!(supervisor.http_state(), Some(ListenerState::Serving));
    assert_eq!(supervisor.rpc_state(), Some(ListenerState::Serving));

    drop(grpc);
    shutdown.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancellation_stops_both_transports() {
    let supervisor = supervisor(Duration::from_secs(5));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let http_port = supervisor.http_addr().unwrap().port();
    let rpc_port = supervisor.rpc_addr().unwrap().port();

    let started = Instant::now();
    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(7), task)
        .await
        .expect("start did not return after cancellation")
        .unwrap();
    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(6));

    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert_eq!(supervisor.http_state(), Some(ListenerState::Stopped));
    assert_eq!(supervisor.rpc_state(), Some(ListenerState::Stopped));
    assert!(common::port_closed(http_port).await);
    assert!(common::port_closed(rpc_port).await);
}

#[tokio::test]
async fn test_signal_triggers_shutdown() {
    let supervisor = supervisor(Duration::from_secs(5));
    let shutdown = Shutdown::new();
    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let task = common::spawn_with_signal(&supervisor, &shutdown, async move {
        let _ = signal_rx.await;
        "SIGTERM"
    });
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    signal_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_http_panic_is_scoped_to_one_request() {
    let supervisor = supervisor(Duration::from_secs(5));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let client = common::client();
    let (exploded, healthy) = tokio::join!(
        client.get(common::http_url(&supervisor, "/explode")).send(),
        client.get(common::http_url(&supervisor, "/health")).send(),
    );

    let exploded = exploded.unwrap();
    assert_eq!(exploded.status(), 500);
    assert_eq!(exploded.text().await.unwrap(), "Internal Server Error");
    assert_eq!(healthy.unwrap().status(), 200);

    // The process and the transport both survive.
    let again = client
        .get(common::http_url(&supervisor, "/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 200);
    assert_eq!(supervisor.state(), SupervisorState::Serving);

    shutdown.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_grpc_panic_returns_internal() {
    let supervisor = supervisor(Duration::from_secs(5));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let mut grpc = common::grpc_client(&supervisor).await;
    let status = grpc
        .unary::<HealthCheckRequest, HealthCheckResponse>(
            tonic::Request::new(HealthCheckRequest {}),
            "/test.Exploding/Explode",
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Internal);
    assert_eq!(status.message(), "Internal server error");

    let health = grpc.health_check(HealthCheckRequest {}).await.unwrap();
    assert!(health.into_inner().status);

    drop(grpc);
    shutdown.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_slow_http_drain_does_not_block_rpc_shutdown() {
    let supervisor = supervisor(Duration::from_millis(500));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let url = common::http_url(&supervisor, "/slow");
    let pending = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    shutdown.trigger();
    task.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(supervisor.http_state(), Some(ListenerState::Stopped));
    assert!(pending.await.unwrap().is_err());

    // The deadline was spent on HTTP, but the idle gRPC server still stops.
    let rpc_port = supervisor.rpc_addr().unwrap().port();
    common::wait_for_rpc_stopped(&supervisor).await;
    assert!(common::port_closed(rpc_port).await);
}

#[tokio::test]
async fn test_second_shutdown_is_a_no_op() {
    let supervisor = supervisor(Duration::from_secs(2));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let url = common::http_url(&supervisor, "/slow");
    let _pending = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown.trigger();
    common::wait_for_state(&supervisor, SupervisorState::ShuttingDown).await;

    // The first shutdown is still draining the slow request.
    let second = tokio::time::timeout(Duration::from_millis(500), supervisor.shutdown()).await;
    assert!(matches!(second, Ok(Ok(()))));
    assert_eq!(supervisor.state(), SupervisorState::ShuttingDown);

    task.await.unwrap().unwrap();
    supervisor.shutdown().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let supervisor = supervisor(Duration::from_secs(2));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let second = supervisor
        .run_until(shutdown.subscribe(), std::future::pending())
        .await;
    assert!(matches!(second, Err(SupervisorError::AlreadyStarted)));

    shutdown.trigger();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_conflict_fails_startup() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let mut config = common::test_config(Duration::from_secs(2));
    config.server.http.port = occupied.local_addr().unwrap().port();

    let supervisor = Supervisor::new(Arc::new(config));
    let shutdown = Shutdown::new();
    let result = supervisor
        .run_until(shutdown.subscribe(), std::future::pending())
        .await;

    assert!(matches!(
        result,
        Err(SupervisorError::Startup(TransportError::Bind { transport: "http", .. }))
    ));
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_fixed_ports_from_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("default.yaml");
    std::fs::write(
        &path,
        r#"
server:
  http:
    port: 18085
    read_timeout: 5s
    write_timeout: 5s
    idle_timeout: 120s
  grpc:
    port: 18086
  shutdown_timeout: 5s
logging:
  level: debug
"#,
    )
    .unwrap();

    let config = load_config(&path, Environment::Development).unwrap();
    assert_eq!(config.server.http.idle_timeout, Duration::from_secs(120));

    let supervisor = Arc::new(Supervisor::new(Arc::new(config)));
    let shutdown = Shutdown::new();
    let task = common::spawn(&supervisor, &shutdown);
    common::wait_for_state(&supervisor, SupervisorState::Serving).await;

    let response = common::client()
        .get("http://127.0.0.1:18085/health")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let mut grpc = voidkit::rpc::common::CommonServiceClient::connect("http://127.0.0.1:18086")
        .await
        .unwrap();
    assert!(grpc.health_check(HealthCheckRequest {}).await.unwrap().into_inner().status);
    drop(grpc);

    let started = Instant::now();
    shutdown.trigger();
    task.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(6));
    assert!(common::port_closed(18085).await);
    assert!(common::port_closed(18086).await);
}
