//! The transport unit: one request in, one response (or failure) out.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

use crate::error::Result;

/// Future returned by [`Transport::round_trip`].
pub type TransportFuture<'a> = BoxFuture<'a, Result<Response<Body>>>;

/// Performs a single request/response exchange.
pub trait Transport: Send + Sync {
    /// Execute the request and produce a response or a failure.
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_>;
}

/// A transport shared between middlewares and clients.
pub type SharedTransport = Arc<dyn Transport>;

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_> {
        (**self).round_trip(request)
    }
}

/// Adapts an async closure into a [`Transport`].
pub struct TransportFn<F> {
    f: F,
}

impl<F> TransportFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
{
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_> {
        Box::pin((self.f)(request))
    }
}

/// Build a shared transport from an async closure.
pub fn transport_fn<F, Fut>(f: F) -> SharedTransport
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
{
    Arc::new(TransportFn::new(f))
}
