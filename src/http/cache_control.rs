//! Response `Cache-Control` policy for gateway routes.

use std::fmt;
use std::str::FromStr;

use axum::http::{header, HeaderValue};
use thiserror::Error;
use tower_http::set_header::SetResponseHeaderLayer;

/// Allowed `Cache-Control` directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Public,
    Private,
    NoStore,
    NoCache,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid cache type: {0}")]
pub struct InvalidCacheType(pub String);

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Public => "public",
            CacheType::Private => "private",
            CacheType::NoStore => "no-store",
            CacheType::NoCache => "no-cache",
        }
    }

    /// Header value, with `max-age` only when `ttl_secs` is positive.
    pub fn header_value(&self, ttl_secs: i64) -> HeaderValue {
        if ttl_secs <= 0 {
            return HeaderValue::from_static(self.as_str());
        }
        HeaderValue::from_str(&format!("{}, max-age={}", self.as_str(), ttl_secs))
            .unwrap_or_else(|_| HeaderValue::from_static(self.as_str()))
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = InvalidCacheType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(CacheType::Public),
            "private" => Ok(CacheType::Private),
            "no-store" => Ok(CacheType::NoStore),
            "no-cache" => Ok(CacheType::NoCache),
            other => Err(InvalidCacheType(other.to_string())),
        }
    }
}

/// Layer that sets `Cache-Control` on every response, replacing any upstream value.
pub fn cache_control_layer(cache_type: CacheType, ttl_secs: i64) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(header::CACHE_CONTROL, cache_type.header_value(ttl_secs))
}
