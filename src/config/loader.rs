//! Configuration loading from disk.
//!
//! A base file (`default.yaml`) is read first; an environment overlay next to
//! it (`default.production.yaml`) is deep-merged on top when present.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;

use crate::config::schema::{Environment, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Path of the environment overlay for `base`, e.g. `conf/default.production.yaml`.
pub fn overlay_path(base: &Path, env: Environment) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}.{}.{}", stem, env, ext.to_string_lossy()),
        None => format!("{}.{}", stem, env),
    };
    base.with_file_name(name)
}

/// Load, merge and validate configuration.
///
/// The environment passed on the command line wins over any
/// `server.environment` written in the files.
pub fn load_config(path: &Path, env: Environment) -> Result<ServiceConfig, ConfigError> {
    let mut merged = read_yaml(path)?;

    let overlay = overlay_path(path, env);
    if overlay.is_file() {
        tracing::info!(path = %overlay.display(), "Merging environment config");
        merge(&mut merged, read_yaml(&overlay)?);
    }

    let mut config: ServiceConfig =
        serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.server.environment = env;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Recursively merge `overlay` into `base`. Mappings merge key by key;
/// anything else in the overlay replaces the base value.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
