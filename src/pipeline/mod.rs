//! Transport pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! HttpClient request
//!     → compose.rs (outermost middleware first)
//!     → logging → headers → cache → circuit breaker
//!     → base.rs (pooled hyper client)
//!     → network
//! Response travels back through the same chain in reverse.
//! ```
//!
//! # Design Decisions
//! - One single-method capability (`Transport`) at every seam
//! - Middlewares hold the next transport and decide to delegate, short-circuit or transform
//! - Composition is plain closure capture; building a chain has no side effects

pub mod base;
pub mod compose;
pub mod headers;
pub mod transport;

pub use base::HyperTransport;
pub use compose::{compose, middleware_fn, Middleware, MiddlewareFn, Pipeline, SharedMiddleware};
pub use headers::HeaderMiddleware;
pub use transport::{transport_fn, SharedTransport, Transport, TransportFn, TransportFuture};

/// Request and response body type carried through the pipeline.
pub use axum::body::Body;
