//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for machine parsing, text format for local development
//! - `RUST_LOG` overrides the configured level when set

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "text" {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init()
    }
}

/// Subscriber for the window before the configuration is loaded.
///
/// Meant for `tracing::subscriber::with_default`, so the real subscriber can
/// still be installed globally by [`init`]. Writes JSON to stderr at the
/// default level.
pub fn bootstrap() -> impl Subscriber + Send + Sync {
    bootstrap_with_writer(std::io::stderr)
}

fn bootstrap_with_writer<W>(writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&LoggingConfig::default()));
    tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(writer),
    )
}

fn default_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::new(format!(
        "{level},voidkit={level},tower_http={level}",
        level = config.level
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn default_filter_uses_configured_level() {
        let config = LoggingConfig {
            level: "warn".into(),
            format: "text".into(),
        };
        let filter = default_filter(&config).to_string();
        assert!(filter.contains("voidkit=warn"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn bootstrap_logs_startup_errors_as_json() {
        let captured = Captured::default();
        let writer = captured.clone();

        tracing::subscriber::with_default(bootstrap_with_writer(move || writer.clone()), || {
            tracing::error!(error = "missing file", "Failed to load configuration");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["message"], "Failed to load configuration");
        assert_eq!(line["error"], "missing file");
    }
}
