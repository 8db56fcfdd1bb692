//! voidkit service binary.
//!
//! Loads the YAML configuration for the selected environment, installs the
//! subscriber, and runs the supervisor until it is told to stop.
//!
//! Exit status is 0 after a graceful shutdown and 1 when configuration,
//! binding, or the supervisor itself fails.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use voidkit::config::{load_config, Environment};
use voidkit::observability::logging;
use voidkit::{panic, Shutdown, Supervisor};

#[derive(Parser)]
#[command(name = "voidkit")]
#[command(about = "Serve HTTP and gRPC under one lifecycle", long_about = None)]
struct Cli {
    /// Base configuration file
    #[arg(short, long, default_value = "default.yaml")]
    config: PathBuf,

    /// Environment overlay to apply (development or production)
    #[arg(short, long, default_value = "development")]
    env: Environment,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    panic::install_hook();

    let loaded = tracing::subscriber::with_default(logging::bootstrap(), || {
        load_config(&cli.config, cli.env).inspect_err(|err| {
            tracing::error!(
                config = %cli.config.display(),
                error = %err,
                "Failed to load configuration"
            );
        })
    });
    let config = match loaded {
        Ok(config) => config,
        Err(_) => return ExitCode::FAILURE,
    };

    if let Err(err) = logging::init(&config.logging) {
        tracing::warn!(error = %err, "Global subscriber already installed");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        environment = %config.server.environment,
        http_port = config.server.http.port,
        grpc_port = config.server.grpc.port,
        shutdown_timeout = ?config.server.shutdown_timeout,
        "voidkit starting"
    );

    let shutdown = Shutdown::new();
    let supervisor = Supervisor::new(Arc::new(config));

    match panic::guard("main", supervisor.start(shutdown.subscribe())).await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Supervisor failed");
            ExitCode::FAILURE
        }
        Err(_) => ExitCode::FAILURE,
    }
}
