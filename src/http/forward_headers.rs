//! Inbound header collection for replay on outbound calls.
//!
//! # Responsibilities
//! - Pick the configured headers (or the default list) off the inbound request
//! - Add `x-origin-app` with the gateway's name
//! - Expose the result as a `ForwardedHeaders` request extension

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::client::ForwardedHeaders;

/// Headers forwarded when no explicit list is configured.
pub const DEFAULT_FORWARD_HEADERS: &[&str] = &[
    "x-request-id",
    "x-canonical-uri",
    "x-client-user-agent",
    "x-platform-id",
    "x-device-id",
    "x-client-version",
    "x-tenant-id",
    "x-profile-type",
    "x-country-code",
    "x-origin-ip",
    "x-hsid",
    "x-glb-exp-id",
];

pub const X_ORIGIN_APP: HeaderName = HeaderName::from_static("x-origin-app");

/// Which headers to collect, shared as middleware state.
#[derive(Clone, Debug)]
pub struct ForwardHeaders {
    app_name: Arc<str>,
    names: Arc<[HeaderName]>,
}

impl ForwardHeaders {
    /// An empty `names` list selects [`DEFAULT_FORWARD_HEADERS`]. Invalid names are dropped.
    pub fn new(app_name: impl Into<String>, names: &[String]) -> Self {
        let names: Vec<HeaderName> = if names.is_empty() {
            DEFAULT_FORWARD_HEADERS
                .iter()
                .copied()
                .map(HeaderName::from_static)
                .collect()
        } else {
            names
                .iter()
                .filter_map(|name| match HeaderName::from_bytes(name.as_bytes()) {
                    Ok(name) => Some(name),
                    Err(_) => {
                        warn!(header = %name, "Ignoring invalid forward header name");
                        None
                    }
                })
                .collect()
        };

        Self {
            app_name: Arc::from(app_name.into()),
            names: names.into(),
        }
    }

    pub fn names(&self) -> &[HeaderName] {
        &self.names
    }

    /// Present, non-empty values of the selected headers plus `x-origin-app`.
    pub fn collect(&self, headers: &HeaderMap) -> ForwardedHeaders {
        let mut forwarded = ForwardedHeaders::new();
        for name in self.names.iter() {
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                if !value.is_empty() {
                    forwarded.insert(name.as_str(), value);
                }
            }
        }
        forwarded.insert(X_ORIGIN_APP.as_str(), self.app_name.as_ref());
        forwarded
    }
}

pub async fn forward_headers_middleware(
    State(config): State<ForwardHeaders>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let forwarded = config.collect(req.headers());
    req.extensions_mut().insert(forwarded);
    next.run(req).await
}
