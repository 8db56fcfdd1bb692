//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful shutdown. Windows falls back
//! to Ctrl+C.
//!
//! Handlers are registered by [`Termination::install`], not on first poll:
//! a signal delivered between `install` and the first `recv` is kept, and
//! never reaches the default disposition.

/// Registered termination handlers.
pub struct Termination {
    handlers: Option<Handlers>,
}

impl Termination {
    /// Register the handlers now.
    ///
    /// If registration fails the error is logged and [`recv`](Self::recv)
    /// never resolves, leaving the other shutdown triggers in charge.
    pub fn install() -> Self {
        match Handlers::register() {
            Ok(handlers) => Self {
                handlers: Some(handlers),
            },
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handlers");
                Self { handlers: None }
            }
        }
    }

    /// Resolves with the signal name once a termination signal arrives.
    pub async fn recv(self) -> &'static str {
        match self.handlers {
            Some(mut handlers) => handlers.recv().await,
            None => std::future::pending().await,
        }
    }
}

/// Install the handlers and wait for the first termination signal.
pub async fn termination() -> &'static str {
    Termination::install().recv().await
}

#[cfg(unix)]
struct Handlers {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Handlers {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(windows)]
struct Handlers {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl Handlers {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "ctrl-c"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_before_first_poll_is_kept() {
        let termination = Termination::install();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let name = tokio::time::timeout(Duration::from_secs(5), termination.recv())
            .await
            .unwrap();
        assert_eq!(name, "SIGTERM");
    }
}
