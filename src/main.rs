//! Edge security gate (v1)
//!
//! A reverse proxy that screens every request before it reaches the
//! application behind it.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                  EDGE GATE                   │
//!   Client Request      │  ┌─────────┐   ┌──────────┐   ┌──────────┐   │
//!   ────────────────────┼─▶│  http   │──▶│   gate   │──▶│ forward  │───┼──▶ Application
//!                       │  │ layers  │   │ checks   │   │ (hyper)  │   │
//!   Client Response     │  └─────────┘   └────┬─────┘   └──────────┘   │
//!   ◀───────────────────┼── headers + cookies │                        │
//!                       │                     ▼                        │
//!                       │   settings store · rate limiter · session    │
//!                       │   refresh · audit sink                       │
//!                       └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gate::config::{load_config, watcher::ConfigWatcher, GateConfig};
use edge_gate::lifecycle::{shutdown_signal, Shutdown};
use edge_gate::observability::{logging, metrics};
use edge_gate::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "edge-gate", version, about = "Edge security gate for a single web application")]
struct Cli {
    /// Path to the TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload gate policies when the config file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!("edge-gate v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_window_secs = config.rate_limit.window_secs,
        rate_limit_max = config.rate_limit.max_requests,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        _ => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
