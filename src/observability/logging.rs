//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (JSON or human-readable)
//! - Log every outbound round trip through `LoggingMiddleware`

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::X_CACHE;
use crate::config::ObservabilityConfig;
use crate::observability::metrics;
use crate::pipeline::{Middleware, SharedTransport, Transport, TransportFuture};

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("http_pipeline={0},{0}", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "Tracing subscriber already installed");
    }
}

/// Logs method, url, status, duration and cache marker of every round trip.
///
/// Place it outermost so cache hits and breaker rejections are logged too.
#[derive(Clone, Debug)]
pub struct LoggingMiddleware {
    service: Arc<str>,
}

impl LoggingMiddleware {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: Arc::from(service.into()),
        }
    }
}

impl Middleware for LoggingMiddleware {
    fn layer(&self, next: SharedTransport) -> SharedTransport {
        Arc::new(LoggingTransport {
            service: self.service.clone(),
            next,
        })
    }
}

struct LoggingTransport {
    service: Arc<str>,
    next: SharedTransport,
}

impl Transport for LoggingTransport {
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_> {
        Box::pin(async move {
            let method = request.method().clone();
            let url = request.uri().to_string();
            let start = Instant::now();

            let result = self.next.round_trip(request).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(response) => {
                    let cache = response
                        .headers()
                        .get(&X_CACHE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    tracing::info!(
                        service = %self.service,
                        method = %method,
                        url = %url,
                        status = response.status().as_u16(),
                        duration_ms,
                        cache,
                        "{}",
                        response.status()
                    );
                    metrics::record_request(&self.service, method.as_str(), response.status().as_u16(), start);
                }
                Err(e) => {
                    tracing::error!(
                        service = %self.service,
                        method = %method,
                        url = %url,
                        duration_ms,
                        error = %e,
                        "Outbound request failed"
                    );
                    metrics::record_request(&self.service, method.as_str(), 0, start);
                }
            }

            result
        })
    }
}
