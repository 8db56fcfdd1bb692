//! Configuration validation.
//!
//! Serde handles the syntactic layer; this module checks value ranges and
//! cross-field constraints. Every problem is reported, not just the first.

use std::fmt;
use std::time::Duration;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "text"];

/// Upper bound for every configured timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ValidationError {
            field: "logging.level",
            message: format!(
                "'{}' is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        errors.push(ValidationError {
            field: "logging.format",
            message: format!(
                "'{}' is not one of {}",
                config.logging.format,
                LOG_FORMATS.join(", ")
            ),
        });
    }

    let http = &config.server.http;
    let durations: [(&'static str, Duration); 4] = [
        ("server.http.read_timeout", http.read_timeout),
        ("server.http.write_timeout", http.write_timeout),
        ("server.http.idle_timeout", http.idle_timeout),
        ("server.shutdown_timeout", config.server.shutdown_timeout),
    ];
    for (field, value) in durations {
        if value.is_zero() {
            errors.push(ValidationError {
                field,
                message: "must be greater than zero".to_string(),
            });
        } else if value > MAX_TIMEOUT {
            errors.push(ValidationError {
                field,
                message: format!("must not exceed {}s", MAX_TIMEOUT.as_secs()),
            });
        }
    }

    if http.port != 0 && http.port == config.server.grpc.port {
        errors.push(ValidationError {
            field: "server.grpc.port",
            message: format!("conflicts with server.http.port ({})", http.port),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
