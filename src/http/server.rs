//! HTTP transport.
//!
//! # Responsibilities
//! - Build the Axum router from the registered routes
//! - Wire up middleware (panic guard, request id, tracing, write timeout)
//! - Accept connections and serve HTTP/1.1 and HTTP/2
//! - Enforce read and idle timeouts per connection
//! - Drain connections on shutdown, abort them past the deadline

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tower::{Layer, Service};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::HttpConfig;
use crate::http::health::HealthRoutes;
use crate::http::request::with_request_id;
use crate::http::routes::{build_routes, RouteRegistrar};
use crate::net::connection::{ConnectionActivity, ConnectionTracker};
use crate::net::listener;
use crate::panic::{HttpRescue, PanicGuardLayer, PanicGuardService};
use crate::transport::control::StopGuard;
use crate::transport::{DrainPolicy, ListenerControl, ListenerState, Transport, TransportError};

const NAME: &str = "http";

type App = PanicGuardService<Router, HttpRescue>;

/// HTTP request/response transport.
pub struct HttpTransport {
    config: HttpConfig,
    app: App,
    listener: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    control: ListenerControl,
}

impl HttpTransport {
    /// Create the transport. The health route is always registered first.
    pub fn new(config: HttpConfig, registrars: &[Arc<dyn RouteRegistrar>]) -> Self {
        let mut all: Vec<Arc<dyn RouteRegistrar>> = vec![Arc::new(HealthRoutes)];
        all.extend(registrars.iter().cloned());

        let app = Self::build_app(&config, build_routes(&all));
        Self {
            config,
            app,
            listener: Mutex::new(None),
            local_addr: OnceLock::new(),
            control: ListenerControl::new(NAME),
        }
    }

    /// Build the middleware stack. The panic guard wraps everything else.
    #[allow(deprecated)]
    fn build_app(config: &HttpConfig, routes: Router) -> App {
        let router = routes
            .layer(TimeoutLayer::new(config.write_timeout))
            .layer(TraceLayer::new_for_http());
        PanicGuardLayer::http().layer(with_request_id(router))
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ListenerState> {
        self.control.subscribe()
    }

    fn connection_builder(&self) -> ConnectionBuilder<TokioExecutor> {
        let mut builder = ConnectionBuilder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.read_timeout);
        builder.http2().timer(TokioTimer::new());
        builder
    }

    fn take_listener(&self) -> Option<TcpListener> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Transport for HttpTransport {
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
            .take_listener()
            .ok_or(TransportError::NotBound { transport: NAME })?;
        let stop_guard = self.control.stop_guard();

        tracing::info!(
            transport = NAME,
            address = ?self.local_addr.get(),
            read_timeout = ?self.config.read_timeout,
            write_timeout = ?self.config.write_timeout,
            idle_timeout = ?self.config.idle_timeout,
            "HTTP server starting"
        );

        let connections = ConnectionTracker::new();
        let mut tasks = JoinSet::new();
        let result = self
            .accept_loop(listener, &connections, &mut tasks)
            .await;

        let drain = drain_connections(tasks, connections, self.control.clone(), stop_guard);
        match result {
            Ok(()) => {
                drain.await;
                Ok(())
            }
            Err(err) => {
                // Report the failure now; in-flight requests keep draining
                // until the supervisor's shutdown reaches this transport.
                tokio::spawn(drain);
                Err(err)
            }
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), TransportError> {
        self.control.shutdown(deadline, DrainPolicy::Abort).await
    }

    fn state(&self) -> ListenerState {
        self.control.state()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

impl HttpTransport {
    /// Accept until a stop is requested. The listening socket is closed on return.
    async fn accept_loop(
        &self,
        listener: TcpListener,
        connections: &ConnectionTracker,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), TransportError> {
        let stop = self.control.stop_requested();
        tokio::pin!(stop);
        let builder = self.connection_builder();

        loop {
            tokio::select! {
                _ = &mut stop => return Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tasks.spawn(serve_connection(
                            stream,
                            peer,
                            builder.clone(),
                            self.app.clone(),
                            self.config.idle_timeout,
                            connections.clone(),
                            self.control.clone(),
                        ));
                    }
                    Err(err) if listener::is_connection_error(&err) => {
                        tracing::debug!(transport = NAME, error = %err, "Accept failed for one connection");
                    }
                    Err(source) => {
                        tracing::error!(transport = NAME, error = %source, "Accept loop failed");
                        return Err(TransportError::Accept { transport: NAME, source });
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        tracing::warn!(transport = NAME, error = %err, "Connection task failed");
                    }
                }
            }
        }
    }
}

/// Serve one connection until it closes, drains, or goes idle.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    builder: ConnectionBuilder<TokioExecutor>,
    app: App,
    idle_timeout: Duration,
    connections: ConnectionTracker,
    control: ListenerControl,
) {
    let guard = connections.track();
    let connection_id = guard.id();
    tracing::debug!(connection_id = %connection_id, peer_addr = %peer, "Connection accepted");

    let activity = ConnectionActivity::new();
    let service_activity = Arc::clone(&activity);
    let service = hyper::service::service_fn(move |request: axum::http::Request<Incoming>| {
        let request_guard = service_activity.begin_request();
        let mut app = app.clone();
        async move {
            let response = app.call(request).await;
            drop(request_guard);
            response
        }
    });

    let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let stop = control.stop_requested();
    tokio::pin!(stop);
    let mut closing = false;

    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(connection_id = %connection_id, error = %err, "Connection error");
                }
                break;
            }
            _ = &mut stop, if !closing => {
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
            _ = activity.idle_timeout(idle_timeout), if !closing => {
                tracing::debug!(connection_id = %connection_id, "Closing idle connection");
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Wait for open connections to finish, aborting them if forced.
async fn drain_connections(
    mut tasks: JoinSet<()>,
    connections: ConnectionTracker,
    control: ListenerControl,
    stop_guard: StopGuard,
) {
    tracing::info!(
        transport = NAME,
        open_connections = connections.active_count(),
        "Draining connections"
    );

    let force = control.force_requested();
    tokio::pin!(force);

    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Err(err)) if err.is_panic() => {
                    tracing::warn!(transport = NAME, error = %err, "Connection task panicked");
                }
                Some(_) => {}
            },
            _ = &mut force => {
                tracing::warn!(
                    transport = NAME,
                    open_connections = connections.active_count(),
                    "Aborting connections still open at the deadline"
                );
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                break;
            }
        }
    }

    drop(stop_guard);
}
