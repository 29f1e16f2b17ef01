//! Demo gateway.
//!
//! Serves `/healthcheck` and proxies `GET /proxy/{*path}` to the configured
//! upstream through the full outbound pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, trace, timeout, origin headers)
//!                         │
//!                         ▼
//!                     http::forward_headers ──▶ ForwardedHeaders extension
//!                         │
//!                         ▼
//!                     client::HttpClient
//!                         │
//!                         ▼
//!          logging → headers → cache (Redis or MemoryStore) → circuit breaker
//!                         │
//!                         ▼
//!                     pipeline::base (hyper) ─────────▶ Upstream
//! ```
//!
//! Usage: `http-pipeline [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use http_pipeline::cache::{MemoryStore, RedisStore, SharedStore};
use http_pipeline::config::{load_config, PipelineConfig};
use http_pipeline::http::GatewayServer;
use http_pipeline::lifecycle::{spawn_signal_handler, Shutdown};
use http_pipeline::observability::{init_tracing, metrics};
use http_pipeline::HttpClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => load_config(&path)?,
        None => PipelineConfig::default(),
    };

    init_tracing(&config.observability);
    tracing::info!("http-pipeline v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        base_url = %config.client.base_url,
        bind_address = %config.server.bind_address,
        cache_enabled = config.cache.enabled,
        breaker_enabled = config.circuit_breaker.enabled,
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

    let store: SharedStore = match &config.cache.store_url {
        Some(url) => Arc::new(RedisStore::connect(url).await?),
        None => {
            let store = MemoryStore::new();
            let sweeper = store.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(60));
                loop {
                    tick.tick().await;
                    let purged = sweeper.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Expired cache entries removed");
                    }
                }
            });
            Arc::new(store)
        }
    };

    let client = HttpClient::from_config(&config, Some(store))?.build()?;

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    GatewayServer::new(config.server.clone(), client)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
