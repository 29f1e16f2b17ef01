//! Demo gateway server.
//!
//! # Responsibilities
//! - Create Axum Router with health check and proxy routes
//! - Wire up middleware (request ID, tracing, timeout, origin headers, forwarding)
//! - Run inbound GETs through the outbound pipeline via `HttpClient`
//! - Shut down gracefully when `Shutdown` fires

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::X_CACHE;
use crate::client::{ForwardedHeaders, HttpClient, RequestContext};
use crate::config::ServerConfig;
use crate::error::ClientError;
use crate::http::cache_control::{cache_control_layer, CacheType};
use crate::http::forward_headers::{forward_headers_middleware, ForwardHeaders, X_ORIGIN_APP};
use crate::lifecycle::Shutdown;

const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: HttpClient,
}

/// HTTP server fronting the outbound pipeline.
pub struct GatewayServer {
    router: Router,
    config: ServerConfig,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, client: HttpClient) -> Self {
        let router = Self::build_router(&config, AppState { client });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let mut proxy = Router::new()
            .route("/proxy/{*path}", get(proxy_handler))
            .with_state(state);

        if let Some(cache_control) = &config.cache_control {
            match cache_control.cache_type.parse::<CacheType>() {
                Ok(cache_type) => {
                    proxy = proxy.layer(cache_control_layer(cache_type, cache_control.ttl_secs));
                }
                Err(e) => tracing::warn!(error = %e, "Cache-Control policy ignored"),
            }
        }

        let origin_app = HeaderValue::from_str(&config.app_name)
            .unwrap_or_else(|_| HeaderValue::from_static("http-pipeline"));
        let forward = ForwardHeaders::new(config.app_name.clone(), &config.forward_headers);

        Router::new()
            .route("/healthcheck", get(healthcheck))
            .merge(proxy)
            .layer(middleware::from_fn_with_state(forward, forward_headers_middleware))
            .layer(middleware::from_fn_with_state(origin_app, origin_headers))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, app = %self.config.app_name, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn healthcheck() -> &'static str {
    "OK"
}

/// Hide server identification and announce the origin app.
async fn origin_headers(State(origin_app): State<HeaderValue>, req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.remove(header::SERVER);
    headers.remove(X_POWERED_BY);
    headers.insert(X_ORIGIN_APP, origin_app);
    response
}

/// GET the upstream path through the pipeline, replaying forwarded headers.
async fn proxy_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    forwarded: Option<Extension<ForwardedHeaders>>,
    uri: Uri,
) -> Response {
    // Always relative to the client's base URL.
    let target = match uri.query() {
        Some(query) => format!("/{path}?{query}"),
        None => format!("/{path}"),
    };
    let ctx = RequestContext {
        forwarded_headers: forwarded.map(|Extension(headers)| headers),
        timeout: None,
    };

    match state.client.get(&ctx, &target).await {
        Ok(upstream) => {
            let mut response = (upstream.status, Json(upstream.body)).into_response();
            for name in [X_CACHE, header::CACHE_CONTROL] {
                if let Some(value) = upstream.headers.get(&name) {
                    response.headers_mut().insert(name, value.clone());
                }
            }
            response
        }
        Err(e) => {
            tracing::warn!(target = %target, error = %e, "Proxied request failed");
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

fn error_status(err: &ClientError) -> StatusCode {
    match err {
        ClientError::CircuitOpen { .. } | ClientError::TooManyTrialRequests { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ClientError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ClientError::InvalidRequest(_) | ClientError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        ClientError::Transport(_)
        | ClientError::Body(_)
        | ClientError::EmptyBody { .. }
        | ClientError::Decode { .. } => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheControlConfig;
    use crate::pipeline::transport_fn;
    use crate::resilience::{CircuitBreakerMiddleware, Settings};
    use axum::http::HeaderMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    type Seen = Arc<Mutex<Vec<(String, HeaderMap)>>>;

    fn upstream(status: u16, body: &'static str) -> (HttpClient, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let client = HttpClient::builder("http://upstream.local/api")
            .transport(transport_fn(move |req: Request<Body>| {
                sink.lock()
                    .unwrap()
                    .push((req.uri().to_string(), req.headers().clone()));
                async move {
                    Ok(axum::http::Response::builder()
                        .status(status)
                        .header("cache-control", "max-age=90")
                        .body(Body::from(body))
                        .unwrap())
                }
            }))
            .build()
            .unwrap();
        (client, seen)
    }

    fn config() -> ServerConfig {
        ServerConfig {
            app_name: "gateway".into(),
            ..ServerConfig::default()
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let (client, _) = upstream(200, "{}");
        let app = GatewayServer::new(config(), client).router();

        let response = app
            .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_ORIGIN_APP], "gateway");
        assert!(response.headers().get(header::SERVER).is_none());
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_string(response).await, "OK");
    }

    #[tokio::test]
    async fn test_proxy_forwards_headers_and_query() {
        let (client, seen) = upstream(200, r#"{"id":7}"#);
        let app = GatewayServer::new(config(), client).router();

        let response = app
            .oneshot(
                Request::get("/proxy/users/7?fields=name")
                    .header("x-request-id", "req-42")
                    .header("x-tenant-id", "acme")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=90");
        assert_eq!(body_string(response).await, r#"{"id":7}"#);

        let seen = seen.lock().unwrap();
        let (url, headers) = &seen[0];
        assert_eq!(url, "http://upstream.local/api/users/7?fields=name");
        assert_eq!(headers["x-request-id"], "req-42");
        assert_eq!(headers["x-tenant-id"], "acme");
        assert_eq!(headers["x-origin-app"], "gateway");
        assert!(headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_generated_request_id_is_forwarded() {
        let (client, seen) = upstream(200, "{}");
        let app = GatewayServer::new(config(), client).router();

        let response = app
            .oneshot(Request::get("/proxy/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let generated = response.headers()["x-request-id"].clone();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1["x-request-id"], generated);
    }

    #[tokio::test]
    async fn test_cache_control_policy_applies_to_proxy_routes() {
        let (client, _) = upstream(200, "{}");
        let config = ServerConfig {
            cache_control: Some(CacheControlConfig {
                cache_type: "private".into(),
                ttl_secs: 15,
            }),
            ..config()
        };
        let app = GatewayServer::new(config, client).router();

        let response = app
            .clone()
            .oneshot(Request::get("/proxy/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CACHE_CONTROL], "private, max-age=15");

        let response = app
            .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
    }

    #[tokio::test]
    async fn test_upstream_failures_map_to_gateway_statuses() {
        let (client, _) = upstream(200, "not json");
        let app = GatewayServer::new(config(), client).router();
        let response = app
            .oneshot(Request::get("/proxy/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let breaker = CircuitBreakerMiddleware::with_settings(Settings::new("upstream").min_requests(1));
        let client = HttpClient::builder("http://upstream.local")
            .middleware(breaker)
            .transport(transport_fn(|_req: Request<Body>| async {
                Err(ClientError::transport("connection refused"))
            }))
            .build()
            .unwrap();
        let app = GatewayServer::new(config(), client).router();

        let first = app
            .clone()
            .oneshot(Request::get("/proxy/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::BAD_GATEWAY);

        let second = app
            .oneshot(Request::get("/proxy/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
