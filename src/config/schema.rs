//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline
//! and the demo gateway. All types derive Serde traits for deserialization
//! from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, SharedStore};
use crate::resilience::Settings;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Outbound client settings (base URL, timeouts, static headers).
    pub client: ClientConfig,

    /// Response cache settings.
    pub cache: CacheSettings,

    /// Circuit breaker settings.
    pub circuit_breaker: BreakerConfig,

    /// Demo gateway listener settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative paths are joined onto.
    pub base_url: String,

    /// Deadline for a whole call in seconds (0 disables it).
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Headers set on every outbound request.
    pub headers: BTreeMap<String, String>,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 5,
            headers: BTreeMap::new(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Enable the cache middleware.
    pub enabled: bool,

    /// TTL in seconds used when `override_ttl` is set.
    pub ttl_secs: u64,

    /// Ignore upstream `max-age` and use `ttl_secs`.
    pub override_ttl: bool,

    /// Request headers that take part in the cache key, in order.
    pub key_headers: Vec<String>,

    /// Largest response body that is cached.
    pub max_body_bytes: usize,

    /// Redis URL of the shared store; the in-process store is used when unset.
    pub store_url: Option<String>,
}

impl CacheSettings {
    /// Middleware configuration over `store`.
    pub fn to_cache_config(&self, store: Option<SharedStore>) -> CacheConfig {
        CacheConfig::new(store)
            .ttl(Duration::from_secs(self.ttl_secs))
            .override_ttl(self.override_ttl)
            .key_headers(self.key_headers.iter().cloned())
            .max_body_bytes(self.max_body_bytes)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            override_ttl: false,
            key_headers: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            store_url: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Enable the circuit breaker middleware.
    pub enabled: bool,

    /// Breaker name used in logs, metrics and errors.
    pub name: String,

    /// Trial requests allowed while half-open.
    pub max_half_open_requests: u32,

    /// Counting window while closed, in seconds (0 never resets).
    pub interval_secs: u64,

    /// Time spent open before trials are allowed, in seconds.
    pub open_timeout_secs: u64,

    /// Minimum calls in the window before tripping is considered.
    pub min_requests: u32,

    /// Failure ratio that trips the breaker.
    pub failure_ratio: f64,
}

impl BreakerConfig {
    pub fn to_settings(&self) -> Settings {
        Settings::new(self.name.clone())
            .max_requests(self.max_half_open_requests)
            .interval(Duration::from_secs(self.interval_secs))
            .timeout(Duration::from_secs(self.open_timeout_secs))
            .min_requests(self.min_requests)
            .failure_ratio(self.failure_ratio)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "upstream".to_string(),
            max_half_open_requests: 10,
            interval_secs: 10,
            open_timeout_secs: 60,
            min_requests: 20,
            failure_ratio: 0.5,
        }
    }
}

/// Demo gateway server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Name sent as `X-Origin-App` on responses and forwarded requests.
    pub app_name: String,

    /// Inbound headers replayed on outbound calls; empty uses the built-in list.
    pub forward_headers: Vec<String>,

    /// Inbound request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Cache-Control applied to proxied responses.
    pub cache_control: Option<CacheControlConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            app_name: "http-pipeline".to_string(),
            forward_headers: Vec::new(),
            request_timeout_secs: 30,
            cache_control: None,
        }
    }
}

/// Response `Cache-Control` policy of the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheControlConfig {
    /// One of public, private, no-store, no-cache.
    pub cache_type: String,

    /// `max-age` in seconds; omitted when zero or negative.
    #[serde(default)]
    pub ttl_secs: i64,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable output.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
