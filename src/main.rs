//! Harvest API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → timeout → body limit → sanitizer
//!                                                                    │
//!                      ┌─────────────────────────────────────────────┘
//!                      ▼
//!     general limiter → tier limiter → authenticator → id / query / body schema
//!                                                                    │
//!                      ┌─────────────────────────────────────────────┘
//!                      ▼
//!     ownership check → handler → store (retried per operation class)
//!
//!     Any stage failure → error classifier → JSON error envelope
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use harvest_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use harvest_gateway::lifecycle::{shutdown_on_signal, Shutdown};
use harvest_gateway::observability::{logging::init_logging, metrics::init_metrics};
use harvest_gateway::store::memory::MemoryStore;
use harvest_gateway::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "harvest-gateway", version, about = "Farm management API gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("harvest-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store = Arc::new(match &config.store.seed_path {
        Some(path) => MemoryStore::from_seed_file(Path::new(path))?,
        None => MemoryStore::new(),
    });

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), Some(updates))
        }
        None => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server = HttpServer::new(config, store.clone(), store)?;
    let receiver = shutdown.subscribe();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { shutdown_on_signal(&shutdown).await }
    });

    server.run(listener, config_updates, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
