//! `http-dispatch` host binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing::Router ──▶ strategy::Action
//!                                                              │
//!                                                              ▼
//!                                                      dispatch::Sender
//!                                                              │
//!                                              [CachingTransport] ──▶ Upstream
//!     Client Response                                          │
//!     ◀────────────── http::response ◀── NormalizedResponse ◀──┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use http_dispatch::config::{load_config, watcher::ConfigWatcher, EngineConfig};
use http_dispatch::connection::{ConnectionFactory, ConnectionRegistry};
use http_dispatch::http::HttpServer;
use http_dispatch::lifecycle::{signals::shutdown_signal, Shutdown};
use http_dispatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "http-dispatch")]
#[command(about = "Configuration-driven HTTP dispatch engine", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve configured actions (default)
    Serve,
    /// Validate the configuration and exit
    Check,
    /// Probe every configured connection
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-dispatch starting");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, cli.config).await,
        Command::Check => {
            tracing::info!(
                connections = config.connections.len(),
                actions = config.actions.len(),
                "Configuration is valid"
            );
            Ok(())
        }
        Command::Ping => ping(&config).await,
    }
}

async fn serve(config: EngineConfig, path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server; dropping it stops notifications.
    let (_watcher, config_updates) = match path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn ping(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ConnectionRegistry::from_settings(&config.connections, &ConnectionFactory)?;
    let mut unhealthy = 0;

    for settings in &config.connections {
        let connection = registry.get(&settings.name)?;
        let healthy = connection.ping().await?;
        if healthy {
            tracing::info!(connection = %settings.name, "Connection healthy");
        } else {
            unhealthy += 1;
            tracing::warn!(connection = %settings.name, "Connection unhealthy");
        }
    }

    if unhealthy > 0 {
        return Err(format!("{} connection(s) unhealthy", unhealthy).into());
    }
    Ok(())
}
