//! Response cache middleware.
//!
//! # Responsibilities
//! - Serve GET responses from the store, marked `X-Cache: HIT`
//! - Forward misses, mark them `X-Cache: MISS`, and persist 2xx responses
//! - Rewrite `Cache-Control` to the effective TTL on both paths
//!
//! # Design Decisions
//! - The inner chain is never invoked on a hit
//! - Persistence runs on a spawned task; the caller never waits for it
//! - A store or decode failure is a miss, never an error for the caller

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{
    header::{CACHE_CONTROL, CONTENT_LENGTH},
    HeaderName, HeaderValue, Method, Request, Response,
};
use tracing::{debug, error, warn};

use crate::cache::key::CacheKey;
use crate::cache::record::{cache_control_value, max_age, CachePolicy, CachedResponse};
use crate::cache::store::{CacheStore, SharedStore};
use crate::cache::CacheError;
use crate::error::{ClientError, Result};
use crate::observability::metrics;
use crate::pipeline::{Middleware, SharedTransport, Transport, TransportFuture};

/// Marker header carrying `HIT` or `MISS`.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const HIT: HeaderValue = HeaderValue::from_static("HIT");
const MISS: HeaderValue = HeaderValue::from_static("MISS");

/// Callback invoked when a detached cache write fails.
pub type WriteErrorHook = Arc<dyn Fn(&CacheKey, &CacheError) + Send + Sync>;

/// Cache middleware configuration.
#[derive(Clone)]
pub struct CacheConfig {
    /// Store handle; `None` disables caching entirely.
    pub store: Option<SharedStore>,
    /// TTL applied when `override_ttl` is set.
    pub ttl: Duration,
    /// Use `ttl` instead of the upstream `max-age`.
    pub override_ttl: bool,
    /// Request headers that take part in the cache key, in order.
    pub key_headers: Vec<String>,
    /// Responses larger than this are passed through without caching.
    pub max_body_bytes: usize,
    /// Observes failed detached writes in addition to logging.
    pub on_write_error: Option<WriteErrorHook>,
}

impl CacheConfig {
    pub fn new(store: Option<SharedStore>) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(60),
            override_ttl: false,
            key_headers: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            on_write_error: None,
        }
    }

    pub fn with_store(store: impl CacheStore + 'static) -> Self {
        Self::new(Some(Arc::new(store)))
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn override_ttl(mut self, enabled: bool) -> Self {
        self.override_ttl = enabled;
        self
    }

    pub fn key_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn on_write_error(mut self, hook: impl Fn(&CacheKey, &CacheError) + Send + Sync + 'static) -> Self {
        self.on_write_error = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("store", &self.store.is_some())
            .field("ttl", &self.ttl)
            .field("override_ttl", &self.override_ttl)
            .field("key_headers", &self.key_headers)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Caches GET responses in a [`CacheStore`].
#[derive(Clone, Debug)]
pub struct CacheMiddleware {
    config: Arc<CacheConfig>,
}

impl CacheMiddleware {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl Middleware for CacheMiddleware {
    fn layer(&self, next: SharedTransport) -> SharedTransport {
        Arc::new(CacheTransport {
            config: self.config.clone(),
            next,
        })
    }
}

struct CacheTransport {
    config: Arc<CacheConfig>,
    next: SharedTransport,
}

impl Transport for CacheTransport {
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_> {
        Box::pin(self.call(request))
    }
}

impl CacheTransport {
    async fn call(&self, request: Request<Body>) -> Result<Response<Body>> {
        let store = match &self.config.store {
            Some(store) if request.method() == Method::GET => store.clone(),
            _ => return self.next.round_trip(request).await,
        };

        let key = CacheKey::from_request(&request, &self.config.key_headers);

        if let Some(response) = self.lookup(store.as_ref(), &key).await {
            return Ok(response);
        }

        let response = self.next.round_trip(request).await?;
        self.store_response(store, key, response).await
    }

    async fn lookup(&self, store: &dyn CacheStore, key: &CacheKey) -> Option<Response<Body>> {
        let value = match store.get(key.as_str()).await {
            Ok(Some(value)) if !value.is_empty() => value,
            Ok(_) => {
                metrics::record_cache_lookup("miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, fetching live");
                metrics::record_cache_lookup("error");
                return None;
            }
        };

        let rebuilt = CachedResponse::from_json(&value).and_then(|record| {
            let max_age = record.policy.max_age;
            record.into_response().map(|response| (response, max_age))
        });

        match rebuilt {
            Ok((mut response, max_age)) => {
                let headers = response.headers_mut();
                headers.insert(CACHE_CONTROL, cache_control_value(max_age));
                headers.insert(X_CACHE, HIT);
                metrics::record_cache_lookup("hit");
                debug!(key = %key, "Served from cache");
                Some(response)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                metrics::record_cache_lookup("corrupt");
                None
            }
        }
    }

    async fn store_response(
        &self,
        store: SharedStore,
        key: CacheKey,
        response: Response<Body>,
    ) -> Result<Response<Body>> {
        let (mut parts, body) = response.into_parts();

        if !parts.status.is_success() {
            parts.headers.insert(X_CACHE, MISS);
            return Ok(Response::from_parts(parts, body));
        }

        let original_max_age = max_age(&parts.headers);
        let effective_ttl = if self.config.override_ttl {
            self.config.ttl.as_secs()
        } else {
            original_max_age
        };
        parts
            .headers
            .insert(CACHE_CONTROL, cache_control_value(effective_ttl));

        if self.exceeds_body_limit(&parts.headers) {
            parts.headers.insert(X_CACHE, MISS);
            debug!(key = %key, "Declared body length over cache limit, not caching");
            return Ok(Response::from_parts(parts, body));
        }

        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ClientError::Body(Box::new(e)))?;
        if bytes.len() > self.config.max_body_bytes {
            parts.headers.insert(X_CACHE, MISS);
            debug!(key = %key, size = bytes.len(), "Response body over cache limit, not caching");
            return Ok(Response::from_parts(parts, Body::from(bytes)));
        }

        let policy = CachePolicy {
            max_age: effective_ttl,
            headers: self.config.key_headers.clone(),
        };
        let encoded = CachedResponse::capture(&parts, &bytes, original_max_age, policy)
            .and_then(|record| record.to_json());

        parts.headers.insert(X_CACHE, MISS);

        match encoded {
            Ok(_) if effective_ttl == 0 => {
                debug!(key = %key, "Response has no max-age, not caching");
            }
            Ok(value) => self.spawn_write(store, key, value, Duration::from_secs(effective_ttl)),
            Err(e) => {
                warn!(key = %key, error = %e, "Response not cacheable");
            }
        }

        Ok(Response::from_parts(parts, Body::from(bytes)))
    }

    fn exceeds_body_limit(&self, headers: &axum::http::HeaderMap) -> bool {
        headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .is_some_and(|len| len > self.config.max_body_bytes)
    }

    fn spawn_write(&self, store: SharedStore, key: CacheKey, value: String, ttl: Duration) {
        let hook = self.config.on_write_error.clone();

        // Detached: dropping the caller's future must not cancel the write.
        tokio::spawn(async move {
            match store.set(key.as_str(), value, ttl).await {
                Ok(()) => {
                    metrics::record_cache_write("ok");
                    debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached response");
                }
                Err(e) => {
                    metrics::record_cache_write("error");
                    error!(key = %key, error = %e, "Error saving to cache");
                    if let Some(hook) = hook {
                        hook(&key, &e);
                    }
                }
            }
        });
    }
}
