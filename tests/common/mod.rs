//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use voidkit::config::{Environment, ServiceConfig};
use voidkit::lifecycle::{Shutdown, Supervisor, SupervisorError, SupervisorState};
use voidkit::rpc::common::CommonServiceClient;
use voidkit::ListenerState;

/// HTTP client that never routes through a proxy from the environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap()
}

/// Config on ephemeral ports with a short drain deadline.
pub fn test_config(shutdown_timeout: Duration) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.http.port = 0;
    config.server.grpc.port = 0;
    config.server.environment = Environment::Development;
    config.server.shutdown_timeout = shutdown_timeout;
    config
}

/// Run `supervisor` on its own task with `signal` standing in for SIGINT/SIGTERM.
pub fn spawn_with_signal<S>(
    supervisor: &Arc<Supervisor>,
    shutdown: &Shutdown,
    signal: S,
) -> JoinHandle<Result<(), SupervisorError>>
where
    S: Future<Output = &'static str> + Send + 'static,
{
    let supervisor = Arc::clone(supervisor);
    let cancel = shutdown.subscribe();
    tokio::spawn(async move { supervisor.run_until(cancel, signal).await })
}

/// Run `supervisor` until `shutdown` is triggered.
pub fn spawn(
    supervisor: &Arc<Supervisor>,
    shutdown: &Shutdown,
) -> JoinHandle<Result<(), SupervisorError>> {
    spawn_with_signal(supervisor, shutdown, std::future::pending())
}

/// Wait until the supervisor reports `state`.
pub async fn wait_for_state(supervisor: &Supervisor, state: SupervisorState) {
    let mut rx = supervisor.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|current| *current == state))
        .await
        .expect("supervisor did not reach the expected state")
        .unwrap();
}

/// Wait until the gRPC transport reports `Stopped`.
pub async fn wait_for_rpc_stopped(supervisor: &Supervisor) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while supervisor.rpc_state() != Some(ListenerState::Stopped) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "gRPC transport did not stop"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn http_url(supervisor: &Supervisor, path: &str) -> String {
    let port = supervisor.http_addr().unwrap().port();
    format!("http://127.0.0.1:{}{}", port, path)
}

pub async fn grpc_client(
    supervisor: &Supervisor,
) -> CommonServiceClient<tonic::transport::Channel> {
    let port = supervisor.rpc_addr().unwrap().port();
    CommonServiceClient::connect(format!("http://127.0.0.1:{}", port))
        .await
        .unwrap()
}

/// True when nothing accepts connections on `port` anymore.
pub async fn port_closed(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_err()
}
