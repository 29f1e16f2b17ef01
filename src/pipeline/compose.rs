//! Middleware composition.
//!
//! The first middleware in a list is the outermost: it sees the request first
//! and the response last.

use std::sync::Arc;

use crate::pipeline::transport::SharedTransport;

/// Wraps a transport with additional behavior.
pub trait Middleware: Send + Sync {
    /// Return a transport that delegates to `next`.
    fn layer(&self, next: SharedTransport) -> SharedTransport;
}

/// A middleware shared between pipelines.
pub type SharedMiddleware = Arc<dyn Middleware>;

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn layer(&self, next: SharedTransport) -> SharedTransport {
        (**self).layer(next)
    }
}

/// Middleware built from a plain closure.
pub struct MiddlewareFn<F> {
    f: F,
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(SharedTransport) -> SharedTransport + Send + Sync,
{
    fn layer(&self, next: SharedTransport) -> SharedTransport {
        (self.f)(next)
    }
}

/// Build a middleware from a closure taking the next transport.
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F>
where
    F: Fn(SharedTransport) -> SharedTransport + Send + Sync,
{
    MiddlewareFn { f }
}

/// Wrap `base` with `middlewares`, first entry outermost.
pub fn compose(middlewares: &[SharedMiddleware], base: SharedTransport) -> SharedTransport {
    middlewares
        .iter()
        .rev()
        .fold(base, |next, middleware| middleware.layer(next))
}

/// Builder collecting middlewares in execution order around a base transport.
#[derive(Clone)]
pub struct Pipeline {
    base: SharedTransport,
    middlewares: Vec<SharedMiddleware>,
}

impl Pipeline {
    /// Start a pipeline around the innermost transport.
    pub fn new(base: SharedTransport) -> Self {
        Self {
            base,
            middlewares: Vec::new(),
        }
    }

    /// Append a middleware; it runs inside every middleware added before it.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append an already shared middleware.
    pub fn with_shared(mut self, middleware: SharedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Compose the chain. Can be called repeatedly; each call builds a fresh chain.
    pub fn build(&self) -> SharedTransport {
        compose(&self.middlewares, self.base.clone())
    }
}
