//! Caller-side cancellation for the supervisor.
//!
//! An embedder that wants to stop the service without an OS signal holds a
//! [`Shutdown`], hands `subscribe()` to `Supervisor::start`, and calls
//! `trigger()` later.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Broadcast trigger that any number of tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the trigger. Subscribers created afterwards do not see it.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when `rx` is triggered.
///
/// If every sender is dropped without triggering, this never resolves: a
/// caller that discards its `Shutdown` has given up the ability to cancel,
/// not asked for cancellation.
pub async fn cancelled(mut rx: broadcast::Receiver<()>) {
    match rx.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => {}
        Err(RecvError::Closed) => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let a = shutdown.subscribe();
        let b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        cancelled(a).await;
        cancelled(b).await;
    }

    #[tokio::test]
    async fn dropped_sender_is_not_cancellation() {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        drop(shutdown);

        let waited = tokio::time::timeout(Duration::from_millis(50), cancelled(rx)).await;
        assert!(waited.is_err());
    }
}
