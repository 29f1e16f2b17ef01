//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ratios within 0..=1, limits > 0, addresses parse)
//! - Validate names used at runtime (header names, cache types)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue, Uri};

use crate::cache::RedisUrl;
use crate::config::schema::PipelineConfig;
use crate::http::cache_control::CacheType;

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let client = &config.client;
    if client.base_url.is_empty() {
        errors.push(ValidationError::new("client.base_url", "must not be empty"));
    } else if client.base_url.parse::<Uri>().is_err() {
        errors.push(ValidationError::new("client.base_url", "is not a valid URL"));
    }
    for (name, value) in &client.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("client.headers.{name}"),
                "is not a valid header",
            ));
        }
    }

    let cache = &config.cache;
    if cache.override_ttl && cache.ttl_secs == 0 {
        errors.push(ValidationError::new(
            "cache.ttl_secs",
            "must be greater than 0 when override_ttl is set",
        ));
    }
    if cache.max_body_bytes == 0 {
        errors.push(ValidationError::new("cache.max_body_bytes", "must be greater than 0"));
    }
    if let Some(url) = &cache.store_url {
        if let Err(e) = url.parse::<RedisUrl>() {
            errors.push(ValidationError::new("cache.store_url", e.to_string()));
        }
    }
    for name in &cache.key_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "cache.key_headers",
                format!("`{name}` is not a valid header name"),
            ));
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.name.is_empty() {
        errors.push(ValidationError::new("circuit_breaker.name", "must not be empty"));
    }
    if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_ratio",
            "must be within (0, 1]",
        ));
    }
    if breaker.max_half_open_requests == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.max_half_open_requests",
            "must be greater than 0",
        ));
    }
    if breaker.open_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.open_timeout_secs",
            "must be greater than 0",
        ));
    }

    let server = &config.server;
    if server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("server.bind_address", "is not a socket address"));
    }
    if server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if let Some(cache_control) = &server.cache_control {
        if let Err(e) = cache_control.cache_type.parse::<CacheType>() {
            errors.push(ValidationError::new("server.cache_control.cache_type", e.to_string()));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
