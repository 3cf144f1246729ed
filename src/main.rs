//! status-remap server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer ─▶ StatusRemap ─▶ Timeout ─▶ handler
//!                                       │                        │
//!                                       │   DeferredResponse ◀───┘
//!                                       │   (status, redirect, body buffered)
//!                                       ▼
//!                                  RemapFilter: 500 on failure,
//!                                  trigger → replacement, finalize
//!     Client Response                   │
//!     ◀─────────────────────────────────┘  exactly one commit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use status_remap::config::{load_config, watcher::ConfigWatcher, ServerConfig};
use status_remap::lifecycle::Shutdown;
use status_remap::observability::{logging, metrics};
use status_remap::HttpServer;

#[derive(Parser)]
#[command(name = "status-remap")]
#[command(about = "HTTP server that rewrites response status codes before they are sent", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Extra status mapping, e.g. `--map 404=410`. May be repeated.
    #[arg(short, long = "map", value_name = "FROM=TO")]
    maps: Vec<String>,

    /// Reload the status mapping when the config file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

/// Split `FROM=TO`. A missing `=` yields an empty value, which the mapping
/// builder reports and drops like any other malformed pair.
fn split_pair(raw: &str) -> (String, String) {
    match raw.split_once('=') {
        Some((from, to)) => (from.to_string(), to.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_filter);
    tracing::info!("status-remap v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        max_body_bytes = config.remap.max_body_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let overrides = cli.maps.iter().map(|raw| split_pair(raw)).collect();
    let shutdown = Shutdown::new();
    let server = HttpServer::with_overrides(config, overrides);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
