//! HTTP client transport pipeline.
//!
//! Outbound requests run through a composed chain of middlewares over a
//! pooled base transport. The chain carries a response cache backed by a
//! pluggable key-value store and a circuit breaker, and a small facade turns
//! verb calls into requests and JSON-decoded responses.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;

pub use cache::{CacheConfig, CacheMiddleware, CacheStore, MemoryStore, X_CACHE};
pub use client::{ForwardedHeaders, HttpClient, HttpResponse, RequestContext};
pub use config::PipelineConfig;
pub use error::{ClientError, Result};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use pipeline::{compose, Body, Middleware, Pipeline, SharedTransport, Transport};
pub use resilience::{BreakerRegistry, CircuitBreaker, CircuitBreakerMiddleware};
