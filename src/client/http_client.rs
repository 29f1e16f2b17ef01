//! HTTP client facade over a composed transport.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri};
use serde_json::Value;

use crate::cache::{CacheMiddleware, SharedStore};
use crate::client::context::RequestContext;
use crate::config::PipelineConfig;
use crate::error::{ClientError, Result};
use crate::observability::LoggingMiddleware;
use crate::pipeline::headers::apply_headers;
use crate::pipeline::{
    compose, HeaderMiddleware, HyperTransport, Middleware, SharedMiddleware, SharedTransport, Transport,
};
use crate::resilience::CircuitBreakerMiddleware;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Decoded response handed back to callers.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub body: Value,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Verb-level entry point. Cheap to clone; clones share the transport chain.
#[derive(Clone)]
pub struct HttpClient {
    base_url: Arc<str>,
    headers: Arc<HeaderMap>,
    timeout: Duration,
    transport: SharedTransport,
}

impl HttpClient {
    pub fn builder(base_url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder::new(base_url)
    }

    /// Builder carrying the configured client settings and the recommended
    /// chain: logging → static headers → cache → circuit breaker.
    ///
    /// The cache is only added when enabled and `store` is present.
    pub fn from_config(config: &PipelineConfig, store: Option<SharedStore>) -> Result<HttpClientBuilder> {
        let mut builder = HttpClientBuilder::new(config.client.base_url.clone())
            .timeout(config.client.timeout())
            .connect_timeout(config.client.connect_timeout())
            .middleware(LoggingMiddleware::new(config.circuit_breaker.name.clone()));

        if !config.client.headers.is_empty() {
            builder = builder.middleware(HeaderMiddleware::from_pairs(&config.client.headers)?);
        }
        if config.cache.enabled && store.is_some() {
            builder = builder.middleware(CacheMiddleware::new(config.cache.to_cache_config(store)));
        }
        if config.circuit_breaker.enabled {
            builder = builder.middleware(CircuitBreakerMiddleware::with_settings(
                config.circuit_breaker.to_settings(),
            ));
        }

        Ok(builder)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client-wide deadline for a whole call. Zero disables it.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub async fn get(&self, ctx: &RequestContext, path: &str) -> Result<HttpResponse> {
        self.request(Method::GET, ctx, path, None).await
    }

    pub async fn post(&self, ctx: &RequestContext, path: &str, body: impl Into<Body>) -> Result<HttpResponse> {
        self.request(Method::POST, ctx, path, Some(body.into())).await
    }

    pub async fn put(&self, ctx: &RequestContext, path: &str, body: impl Into<Body>) -> Result<HttpResponse> {
        self.request(Method::PUT, ctx, path, Some(body.into())).await
    }

    pub async fn patch(&self, ctx: &RequestContext, path: &str, body: impl Into<Body>) -> Result<HttpResponse> {
        self.request(Method::PATCH, ctx, path, Some(body.into())).await
    }

    pub async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<HttpResponse> {
        self.request(Method::DELETE, ctx, path, None).await
    }

    pub async fn head(&self, ctx: &RequestContext, path: &str) -> Result<HttpResponse> {
        self.request(Method::HEAD, ctx, path, None).await
    }

    /// Build, send and decode one request.
    pub async fn request(
        &self,
        method: Method,
        ctx: &RequestContext,
        path: &str,
        body: Option<Body>,
    ) -> Result<HttpResponse> {
        let url = self.resolve(path);
        tracing::debug!(method = %method, url = %url, "Outbound request");

        let request = self.build_request(method.clone(), &url, ctx, body)?;
        let deadline = ctx.timeout.unwrap_or(self.timeout);

        let exchange = self.exchange(request);
        let (status, headers, bytes) = if deadline.is_zero() {
            exchange.await?
        } else {
            match tokio::time::timeout(deadline, exchange).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(method = %method, url = %url, timeout = ?deadline, "Outbound request timed out");
                    return Err(ClientError::Timeout(deadline));
                }
            }
        };

        let body = decode(&method, status, &bytes)?;
        Ok(HttpResponse { body, status, headers })
    }

    /// Absolute targets (anything starting with "http") are used verbatim;
    /// everything else is joined onto the base URL with exactly one slash.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        ctx: &RequestContext,
        body: Option<Body>,
    ) -> Result<Request<Body>> {
        let uri: Uri = url.parse().map_err(|e: axum::http::uri::InvalidUri| ClientError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.unwrap_or_else(Body::empty))?;

        let headers = request.headers_mut();
        if let Some(forwarded) = &ctx.forwarded_headers {
            forwarded.apply_to(headers);
        }
        apply_headers(headers, &self.headers);

        if request.method() == Method::POST && !request.headers().contains_key(header::CONTENT_TYPE) {
            request.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }

        Ok(request)
    }

    /// Run the chain and read the body fully, all under the caller's deadline.
    async fn exchange(&self, request: Request<Body>) -> Result<(StatusCode, HeaderMap, bytes::Bytes)> {
        let response = self.transport.round_trip(request).await?;
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ClientError::Body(e.into()))?;
        Ok((parts.status, parts.headers, bytes))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn decode(method: &Method, status: StatusCode, bytes: &[u8]) -> Result<Value> {
    if method == Method::HEAD {
        return Ok(Value::Null);
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ClientError::EmptyBody { status });
    }
    serde_json::from_slice(bytes).map_err(|source| ClientError::Decode { status, source })
}

/// Collects the client's static configuration and middleware list.
pub struct HttpClientBuilder {
    base_url: String,
    timeout: Duration,
    connect_timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    middlewares: Vec<SharedMiddleware>,
    transport: Option<SharedTransport>,
}

impl HttpClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: None,
            headers: Vec::new(),
            middlewares: Vec::new(),
            transport: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect timeout of the default base transport. Ignored with `transport`.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Static header set on every request, after forwarded headers.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a middleware. The first one added is the outermost.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn middlewares(mut self, middlewares: impl IntoIterator<Item = SharedMiddleware>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Replace the base transport (defaults to a pooled hyper client).
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(axum::http::Error::from)?;
            let value = HeaderValue::from_str(value).map_err(axum::http::Error::from)?;
            headers.insert(name, value);
        }

        let base = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::with_connect_timeout(self.connect_timeout)),
        };

        Ok(HttpClient {
            base_url: Arc::from(self.base_url),
            headers: Arc::new(headers),
            timeout: self.timeout,
            transport: compose(&self.middlewares, base),
        })
    }
}
