//! Lifecycle bookkeeping shared between a transport's serve loop and its
//! shutdown caller.
//!
//! The serve loop watches `stop` (drain gracefully) and `force` (abort what
//! is left). `shutdown` flips those flags and waits on `state`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::transport::{ListenerState, TransportError};

/// What `shutdown` does once the deadline passes with work still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Abort remaining connections, then report the timeout.
    Abort,
    /// Report the timeout and leave remaining work running.
    Abandon,
}

#[derive(Debug)]
struct Inner {
    name: &'static str,
    state: watch::Sender<ListenerState>,
    stop: watch::Sender<bool>,
    force: watch::Sender<bool>,
}

/// Shared lifecycle handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ListenerControl {
    inner: Arc<Inner>,
}

impl ListenerControl {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(ListenerState::Unbound);
        let (stop, _) = watch::channel(false);
        let (force, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name,
                state,
                stop,
                force,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn state(&self) -> ListenerState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.inner.state.subscribe()
    }

    /// `Unbound → Serving`. Fails for any other starting state.
    pub fn mark_serving(&self) -> Result<(), TransportError> {
        let moved = self.inner.state.send_if_modified(|state| {
            if *state == ListenerState::Unbound {
                *state = ListenerState::Serving;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(TransportError::AlreadyStarted {
                transport: self.inner.name,
            })
        }
    }

    pub fn mark_stopped(&self) {
        self.inner.state.send_replace(ListenerState::Stopped);
    }

    /// Guard that marks the transport stopped when dropped, including on unwind.
    pub fn stop_guard(&self) -> StopGuard {
        StopGuard {
            control: self.clone(),
        }
    }

    /// Resolves once a graceful stop was requested.
    pub fn stop_requested(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.stop.subscribe();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    }

    /// Raw receiver for loops that need to poll the stop flag repeatedly.
    pub fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.inner.stop.subscribe()
    }

    /// Resolves once remaining work must be aborted.
    pub fn force_requested(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.force.subscribe();
        async move {
            let _ = rx.wait_for(|force| *force).await;
        }
    }

    /// Resolves once the transport reached `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == ListenerState::Stopped).await;
    }

    /// Drive the shutdown sequence.
    ///
    /// Only the call that moves `Serving → ShuttingDown` requests the stop;
    /// later calls wait on the same drain. A transport that never bound goes
    /// straight to `Stopped`, and a stopped one returns immediately.
    pub async fn shutdown(
        &self,
        deadline: Instant,
        policy: DrainPolicy,
    ) -> Result<(), TransportError> {
        let mut initiated = false;
        let mut already_stopped = false;
        self.inner.state.send_if_modified(|state| match *state {
            ListenerState::Unbound => {
                *state = ListenerState::Stopped;
                already_stopped = true;
                true
            }
            ListenerState::Stopped => {
                already_stopped = true;
                false
            }
            ListenerState::Serving => {
                *state = ListenerState::ShuttingDown;
                initiated = true;
                true
            }
            ListenerState::ShuttingDown => false,
        });

        if already_stopped {
            tracing::debug!(transport = self.inner.name, "Transport already stopped");
            return Ok(());
        }
        if initiated {
            tracing::info!(transport = self.inner.name, "Stopping transport");
            self.inner.stop.send_replace(true);
        }

        if tokio::time::timeout_at(deadline, self.stopped()).await.is_ok() {
            return Ok(());
        }

        match policy {
            DrainPolicy::Abort => {
                tracing::warn!(
                    transport = self.inner.name,
                    "Drain deadline exceeded, aborting remaining connections"
                );
                self.inner.force.send_replace(true);
                self.stopped().await;
            }
            DrainPolicy::Abandon => {
                tracing::warn!(
                    transport = self.inner.name,
                    "Drain deadline exceeded, leaving in-flight calls running"
                );
            }
        }

        Err(TransportError::DrainTimeout {
            transport: self.inner.name,
        })
    }
}

/// Marks the owning transport `Stopped` on drop.
#[derive(Debug)]
pub struct StopGuard {
    control: ListenerControl,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.control.mark_stopped();
        tracing::info!(transport = self.control.name(), "Transport stopped");
    }
}
