//! Hearth & Flame API guard.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request ID → trace → timeout
//!                       │
//!                       ▼
//!              ┌──────────────────────────────────────────────┐
//!              │ pipeline (fixed chain)                       │
//!              │  transport → body → scan → audit → tagging   │
//!              │  → sql/nosql → brute-force → honeypot        │
//!              │  → upload → content-type                     │
//!              └──────────────────────┬───────────────────────┘
//!                                     ▼
//!              ┌──────────────────────────────────────────────┐
//!              │ route groups                                 │
//!              │  /api/auth/*   auth tier + throttle          │
//!              │  /api/admin/*  admin tier + bearer + role    │
//!              │  host routes   api / strict tier             │
//!              └──────────────────────┬───────────────────────┘
//!                                     ▼
//!                                  handler
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use hearth_guard::auth::InMemoryUserStore;
use hearth_guard::config::{load_config, load_from_env};
use hearth_guard::lifecycle::{spawn_signal_listener, Shutdown};
use hearth_guard::observability::{logging, metrics};
use hearth_guard::HttpServer;

#[derive(Parser)]
#[command(name = "hearth-guard", version, about = "Request security pipeline for the storefront API")]
struct Args {
    /// TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file of user records to seed the in-memory store.
    #[arg(short, long, env = "HEARTH_USERS")]
    users: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability, config.environment);
    tracing::info!("hearth-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        trust_proxy = config.listener.trust_proxy,
        rate_limiting = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let store = match &args.users {
        Some(path) => InMemoryUserStore::load_from_file(path)?,
        None => InMemoryUserStore::new(),
    };
    tracing::info!(users = store.len(), "User store ready");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config, Arc::new(store))?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
