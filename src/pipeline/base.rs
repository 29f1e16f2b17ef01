//! Base network transport.
//!
//! # Responsibilities
//! - Execute requests against the network with a pooled hyper client
//! - Convert hyper bodies into pipeline bodies
//!
//! Connection pooling, HTTP/1.1 keep-alive and HTTP/2 are delegated to
//! `hyper-util`'s legacy client.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::ClientError;
use crate::pipeline::transport::{Transport, TransportFuture};

/// The innermost transport that talks to the network.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl HyperTransport {
    /// Create a transport without a connect timeout.
    pub fn new() -> Self {
        Self::with_connect_timeout(None)
    }

    /// Create a transport whose connection attempts give up after `timeout`.
    pub fn with_connect_timeout(timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(timeout);
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_> {
        Box::pin(async move {
            let response = self
                .client
                .request(request)
                .await
                .map_err(ClientError::transport)?;

            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}
