//! Supervisor driving both transports through one lifecycle.
//!
//! # State Machine
//! ```text
//! Idle → Starting → Serving → ShuttingDown → Stopped
//!          │                                   ▲
//!          └──────── bind failure ─────────────┘
//! ```
//!
//! # Termination Triggers
//! The first of these ends `Serving`; no source has priority over another:
//! - a listener task reporting a runtime error (bounded channel, one slot per listener)
//! - SIGINT / SIGTERM
//! - the caller's [`Shutdown`](crate::lifecycle::Shutdown) trigger
//! - a direct [`Supervisor::shutdown`] call

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::config::ServiceConfig;
use crate::http::{HttpTransport, RouteRegistrar};
use crate::lifecycle::shutdown::cancelled;
use crate::lifecycle::signals::Termination;
use crate::panic;
use crate::rpc::{RpcTransport, ServiceRegistrar};
use crate::transport::{ListenerState, Transport, TransportError};

/// One slot per listener task, so a report never blocks.
const ERROR_CHANNEL_CAPACITY: usize = 2;

/// Stand-in deadline when `now + shutdown_timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Serving => "serving",
            SupervisorState::ShuttingDown => "shutting_down",
            SupervisorState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What ended the serving phase.
#[derive(Debug)]
pub enum TerminationTrigger {
    Signal(&'static str),
    ListenerError(TransportError),
    Cancelled,
    /// `Supervisor::shutdown` was called directly.
    Requested,
}

impl fmt::Display for TerminationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationTrigger::Signal(name) => write!(f, "signal {}", name),
            TerminationTrigger::ListenerError(err) => write!(f, "listener error: {}", err),
            TerminationTrigger::Cancelled => f.write_str("caller cancellation"),
            TerminationTrigger::Requested => f.write_str("shutdown call"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor was already started")]
    AlreadyStarted,

    #[error("startup failed: {0}")]
    Startup(#[from] TransportError),
}

/// Object-safe view of a [`Transport`] as the supervisor drives it.
trait Supervised: Send + Sync {
    fn name(&self) -> &'static str;
    fn serve(&self) -> BoxFuture<'_, Result<(), TransportError>>;
    fn shutdown(&self, deadline: Instant) -> BoxFuture<'_, Result<(), TransportError>>;
    fn state(&self) -> ListenerState;
    fn local_addr(&self) -> Option<SocketAddr>;
}

impl<T: Transport> Supervised for T {
    fn name(&self) -> &'static str {
        Transport::name(self)
    }

    fn serve(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(Transport::serve(self))
    }

    fn shutdown(&self, deadline: Instant) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(Transport::shutdown(self, deadline))
    }

    fn state(&self) -> ListenerState {
        Transport::state(self)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Transport::local_addr(self)
    }
}

struct Transports {
    http: Arc<dyn Supervised>,
    rpc: Arc<dyn Supervised>,
}

/// Owns the HTTP and gRPC transports for one serving lifetime.
pub struct Supervisor {
    config: Arc<ServiceConfig>,
    routes: Vec<Arc<dyn RouteRegistrar>>,
    services: Vec<Arc<dyn ServiceRegistrar>>,
    state: watch::Sender<SupervisorState>,
    transports: OnceLock<Transports>,
}

impl Supervisor {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            config,
            routes: Vec::new(),
            services: Vec::new(),
            state,
            transports: OnceLock::new(),
        }
    }

    /// Register HTTP routes. Takes effect on `start`.
    pub fn with_routes(mut self, registrar: Arc<dyn RouteRegistrar>) -> Self {
        self.routes.push(registrar);
        self
    }

    /// Register gRPC services. Takes effect on `start`.
    pub fn with_services(mut self, registrar: Arc<dyn ServiceRegistrar>) -> Self {
        self.services.push(registrar);
        self
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.transports.get().and_then(|t| t.http.local_addr())
    }

    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.transports.get().and_then(|t| t.rpc.local_addr())
    }

    pub fn http_state(&self) -> Option<ListenerState> {
        self.transports.get().map(|t| t.http.state())
    }

    pub fn rpc_state(&self) -> Option<ListenerState> {
        self.transports.get().map(|t| t.rpc.state())
    }

    /// Start both transports and serve until SIGINT/SIGTERM, a listener
    /// error, or `cancel` fires; then shut down.
    ///
    /// Signal handlers are registered before either port is bound.
    pub async fn start(&self, cancel: broadcast::Receiver<()>) -> Result<(), SupervisorError> {
        let termination = Termination::install();
        self.run_until(cancel, termination.recv()).await
    }

    /// [`start`](Self::start) with the OS signal source replaced by `signal`,
    /// which resolves with a name for the log.
    pub async fn run_until<S>(
        &self,
        cancel: broadcast::Receiver<()>,
        signal: S,
    ) -> Result<(), SupervisorError>
    where
        S: Future<Output = &'static str> + Send,
    {
        let started = self.state.send_if_modified(|state| {
            if *state == SupervisorState::Idle {
                *state = SupervisorState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SupervisorError::AlreadyStarted);
        }

        let transports = match self.transports.get() {
            Some(prepared) => prepared,
            None => match self.bind_transports().await {
                Ok(transports) => self.transports.get_or_init(|| transports),
                Err(err) => {
                    tracing::error!(error = %err, "Startup failed");
                    self.state.send_replace(SupervisorState::Stopped);
                    return Err(err.into());
                }
            },
        };

        let (errors_tx, mut errors) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        spawn_listener("http-listener", Arc::clone(&transports.http), errors_tx.clone());
        spawn_listener("grpc-listener", Arc::clone(&transports.rpc), errors_tx);

        self.state.send_replace(SupervisorState::Serving);
        tracing::info!(
            http_port = transports.http.local_addr().map(|a| a.port()),
            grpc_port = transports.rpc.local_addr().map(|a| a.port()),
            environment = %self.config.server.environment,
            "Supervisor serving"
        );

        let trigger = tokio::select! {
            Some(err) = errors.recv() => TerminationTrigger::ListenerError(err),
            name = signal => TerminationTrigger::Signal(name),
            _ = cancelled(cancel) => TerminationTrigger::Cancelled,
            _ = self.left_serving() => TerminationTrigger::Requested,
        };

        match &trigger {
            TerminationTrigger::ListenerError(err) => {
                tracing::error!(error = %err, "Server error, shutting down");
            }
            _ => tracing::info!(trigger = %trigger, "Termination requested"),
        }

        self.shutdown().await?;
        self.stopped().await;
        Ok(())
    }

    /// Shut both transports down within the configured deadline.
    ///
    /// Only the first call does any work; later calls return at once.
    /// Transport errors are logged, never returned.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        if panic::guard("supervisor-shutdown", self.shutdown_transports())
            .await
            .is_err()
        {
            self.state.send_replace(SupervisorState::Stopped);
        }
        Ok(())
    }

    async fn shutdown_transports(&self) {
        let mut initiated = false;
        self.state.send_if_modified(|state| match *state {
            SupervisorState::Serving => {
                *state = SupervisorState::ShuttingDown;
                initiated = true;
                true
            }
            SupervisorState::Idle => {
                *state = SupervisorState::Stopped;
                true
            }
            SupervisorState::Starting | SupervisorState::ShuttingDown | SupervisorState::Stopped => {
                false
            }
        });
        if !initiated {
            tracing::debug!(state = %self.state(), "Shutdown not initiated");
            return;
        }

        let timeout = self.config.server.shutdown_timeout;
        let deadline = deadline_after(timeout);
        tracing::info!(timeout = ?timeout, "Shutting down servers");

        if let Some(transports) = self.transports.get() {
            shutdown_one("http-shutdown", transports.http.as_ref(), deadline).await;
            shutdown_one("grpc-shutdown", transports.rpc.as_ref(), deadline).await;
        }

        self.state.send_replace(SupervisorState::Stopped);
        tracing::info!("Server shutdown complete");
    }

    /// Resolves once something other than the serving loop moved the
    /// supervisor past `Serving`.
    async fn left_serving(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| {
                matches!(
                    state,
                    SupervisorState::ShuttingDown | SupervisorState::Stopped
                )
            })
            .await;
    }

    async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == SupervisorState::Stopped).await;
    }

    async fn bind_transports(&self) -> Result<Transports, TransportError> {
        let server = &self.config.server;
        let http = Arc::new(HttpTransport::new(server.http.clone(), &self.routes));
        let rpc = Arc::new(RpcTransport::new(
            server.grpc.clone(),
            server.environment,
            &self.services,
        )?);

        http.bind().await?;
        rpc.bind().await?;
        Ok(Transports { http, rpc })
    }

    /// Supervisor over transports that are already bound.
    #[cfg(test)]
    fn with_transports(
        config: Arc<ServiceConfig>,
        http: Arc<dyn Supervised>,
        rpc: Arc<dyn Supervised>,
    ) -> Self {
        let supervisor = Self::new(config);
        let _ = supervisor.transports.set(Transports { http, rpc });
        supervisor
    }
}

/// `now + timeout`, or a far-future instant when that overflows.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Shut one transport down. A panic here never keeps the other transport
/// from being shut down.
async fn shutdown_one(boundary: &'static str, transport: &dyn Supervised, deadline: Instant) {
    match panic::guard(boundary, transport.shutdown(deadline)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(transport = transport.name(), error = %err, "Transport shutdown error");
        }
        Err(_) => {}
    }
}

/// Run `transport.serve()` on its own task, reporting runtime errors.
///
/// A panic in the task is logged by the guard and does not count as a
/// termination trigger.
fn spawn_listener(
    boundary: &'static str,
    transport: Arc<dyn Supervised>,
    errors: mpsc::Sender<TransportError>,
) {
    tokio::spawn(async move {
        let name = transport.name();
        match panic::guard(boundary, transport.serve()).await {
            Ok(Ok(())) => tracing::info!(transport = name, "Listener exited"),
            Ok(Err(err)) => {
                tracing::error!(transport = name, error = %err, "Listener failed");
                let _ = errors.send(err).await;
            }
            Err(_) => {}
        }
    });
}
