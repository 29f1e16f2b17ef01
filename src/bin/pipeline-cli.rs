use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use http_pipeline::cache::{CacheConfig, CacheMiddleware, MemoryStore, RedisStore, SharedStore, X_CACHE};
use http_pipeline::client::{HttpClient, HttpResponse, RequestContext};
use http_pipeline::config::ObservabilityConfig;
use http_pipeline::observability::{init_tracing, LoggingMiddleware};
use http_pipeline::pipeline::HeaderMiddleware;
use http_pipeline::resilience::CircuitBreakerMiddleware;

#[derive(Parser)]
#[command(name = "pipeline-cli")]
#[command(about = "Run requests through the HTTP client pipeline", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    base_url: String,

    /// Log level for pipeline events
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path through logging → headers → cache → circuit breaker
    Get {
        path: String,

        /// Extra request header as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Send the request this many times (later calls may hit the cache)
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,

        /// Cache TTL in seconds used with --override-ttl
        #[arg(long, default_value_t = 60)]
        ttl: u64,

        /// Ignore upstream max-age and cache for --ttl seconds
        #[arg(long)]
        override_ttl: bool,

        /// Headers that take part in the cache key
        #[arg(long = "key-header")]
        key_headers: Vec<String>,

        /// Redis URL to cache in instead of process memory
        #[arg(long)]
        store_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        ..ObservabilityConfig::default()
    });

    match cli.command {
        Commands::Get {
            path,
            headers,
            repeat,
            ttl,
            override_ttl,
            key_headers,
            store_url,
        } => {
            let pairs = headers
                .iter()
                .map(|raw| parse_header(raw))
                .collect::<Result<Vec<_>, _>>()?;

            let memory = MemoryStore::new();
            let store: SharedStore = match &store_url {
                Some(url) => Arc::new(RedisStore::connect(url).await?),
                None => Arc::new(memory.clone()),
            };
            let cache = CacheConfig::new(Some(store))
                .ttl(Duration::from_secs(ttl))
                .override_ttl(override_ttl)
                .key_headers(key_headers);

            let client = HttpClient::builder(cli.base_url)
                .middleware(LoggingMiddleware::new("pipeline-cli"))
                .middleware(HeaderMiddleware::from_pairs(pairs)?)
                .middleware(CacheMiddleware::new(cache))
                .middleware(CircuitBreakerMiddleware::new("pipeline-cli"))
                .build()?;

            for attempt in 1..=repeat.max(1) {
                match client.get(&RequestContext::default(), &path).await {
                    Ok(response) => print_response(attempt, &response)?,
                    Err(e) => eprintln!("[{attempt}] Error: {e}"),
                }
                // Give the detached cache write a chance to land before the next call.
                if attempt < repeat {
                    wait_for_store(&memory).await;
                }
            }
        }
    }

    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("invalid header `{raw}`, expected NAME:VALUE")),
    }
}

/// Wait for the first write to land; a remote store just gets the full grace period.
async fn wait_for_store(store: &MemoryStore) {
    for _ in 0..20 {
        if !store.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn print_response(attempt: u32, response: &HttpResponse) -> Result<(), Box<dyn std::error::Error>> {
    let cache = response
        .headers
        .get(&X_CACHE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    println!("[{attempt}] {} (X-Cache: {cache})", response.status);
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    Ok(())
}
