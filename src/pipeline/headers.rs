//! Static header injection.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};

use crate::error::Result;
use crate::pipeline::compose::Middleware;
use crate::pipeline::transport::{SharedTransport, Transport, TransportFuture};

/// Sets a fixed set of headers on every outbound request, replacing existing values.
#[derive(Clone, Debug, Default)]
pub struct HeaderMiddleware {
    headers: Arc<HeaderMap>,
}

impl HeaderMiddleware {
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers: Arc::new(headers),
        }
    }

    /// Build from name/value pairs, rejecting invalid names or values.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())
                .map_err(axum::http::Error::from)?;
            let value = HeaderValue::from_str(value.as_ref()).map_err(axum::http::Error::from)?;
            headers.insert(name, value);
        }
        Ok(Self::new(headers))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Middleware for HeaderMiddleware {
    fn layer(&self, next: SharedTransport) -> SharedTransport {
        Arc::new(HeaderTransport {
            headers: self.headers.clone(),
            next,
        })
    }
}

struct HeaderTransport {
    headers: Arc<HeaderMap>,
    next: SharedTransport,
}

impl Transport for HeaderTransport {
    fn round_trip(&self, mut request: Request<Body>) -> TransportFuture<'_> {
        apply_headers(request.headers_mut(), &self.headers);
        self.next.round_trip(request)
    }
}

/// Copy every header in `source` onto `target`, replacing any values already there.
pub(crate) fn apply_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        target.remove(name);
        for value in source.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}
