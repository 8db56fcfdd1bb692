//! gRPC transport.
//!
//! # Responsibilities
//! - Assemble the service table from registrars (plus reflection in development)
//! - Guard every unary and streaming call against panics
//! - Serve until a graceful stop is requested
//!
//! Shutdown is graceful only: in-flight calls are never killed, so a call
//! that outlives the deadline keeps running after `shutdown` returns.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::Routes;
use tonic::transport::Server;

use crate::config::{Environment, GrpcConfig};
use crate::net::listener;
use crate::panic::PanicGuardLayer;
use crate::rpc::common::CommonServiceHandler;
use crate::rpc::registry::{build_routes, Capabilities, ServiceRegistrar};
use crate::transport::{DrainPolicy, ListenerControl, ListenerState, Transport, TransportError};

const NAME: &str = "grpc";

/// gRPC transport.
pub struct RpcTransport {
    config: GrpcConfig,
    routes: Routes,
    capabilities: Capabilities,
    listener: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    control: ListenerControl,
}

impl RpcTransport {
    /// Create the transport. `CommonService` is always registered first.
    pub fn new(
        config: GrpcConfig,
        environment: Environment,
        registrars: &[Arc<dyn ServiceRegistrar>],
    ) -> Result<Self, TransportError> {
        let mut all: Vec<Arc<dyn ServiceRegistrar>> = vec![Arc::new(CommonServiceHandler)];
        all.extend(registrars.iter().cloned());

        let capabilities = Capabilities::for_environment(environment);
        let routes = build_routes(&all, capabilities).map_err(|err| {
            TransportError::Registration {
                transport: NAME,
                message: err.to_string(),
            }
        })?;

        Ok(Self {
            config,
            routes,
            capabilities,
            listener: Mutex::new(None),
            local_addr: OnceLock::new(),
            control: ListenerControl::new(NAME),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ListenerState> {
        self.control.subscribe()
    }
}

impl Transport for RpcTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn bind(&self) -> Result<SocketAddr, TransportError> {
        if self.control.state() != ListenerState::Unbound {
            return Err(TransportError::AlreadyStarted { transport: NAME });
        }

        let listener = listener::bind(NAME, self.config.port).await?;
        let addr = listener.local_addr().map_err(|source| TransportError::Bind {
            transport: NAME,
            addr: SocketAddr::from(([0, 0, 0, 0], self.config.port)),
            source,
        })?;

        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
        self.control.mark_serving()?;
        let _ = self.local_addr.set(addr);
        Ok(addr)
    }

    async fn serve(&self) -> Result<(), TransportError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::NotBound { transport: NAME })?;
        let _stop_guard = self.control.stop_guard();

        tracing::info!(
            transport = NAME,
            address = ?self.local_addr.get(),
            reflection = self.capabilities.reflection(),
            "gRPC server starting"
        );

        let mut server = Server::builder().layer(PanicGuardLayer::grpc());
        server
            .add_routes(self.routes.clone())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                self.control.stop_requested(),
            )
            .await
            .map_err(|err| {
                tracing::error!(transport = NAME, error = %err, "gRPC server failed");
                TransportError::Serve {
                    transport: NAME,
                    message: err.to_string(),
                }
            })
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), TransportError> {
        self.control.shutdown(deadline, DrainPolicy::Abandon).await
    }

    fn state(&self) -> ListenerState {
        self.control.state()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::common::{CommonServiceClient, HealthCheckRequest};
    use std::time::Duration;

    fn config() -> GrpcConfig {
        GrpcConfig { port: 0 }
    }

    #[tokio::test]
    async fn serves_health_check_and_stops() {
        let transport = Arc::new(RpcTransport::new(config(), Environment::Production, &[]).unwrap());
        let addr = transport.bind().await.unwrap();

        let serving = Arc::clone(&transport);
        let task = tokio::spawn(async move { serving.serve().await });

        let mut client = CommonServiceClient::connect(format!("http://127.0.0.1:{}", addr.port()))
            .await
            .unwrap();
        let response = client.health_check(HealthCheckRequest {}).await.unwrap();
        assert!(response.into_inner().status);
        drop(client);

        transport
            .shutdown(Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(transport.state(), ListenerState::Stopped);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn capabilities_follow_environment() {
        let dev = RpcTransport::new(config(), Environment::Development, &[]).unwrap();
        let prod = RpcTransport::new(config(), Environment::Production, &[]).unwrap();
        assert!(dev.capabilities().reflection());
        assert!(!prod.capabilities().reflection());
    }
}
