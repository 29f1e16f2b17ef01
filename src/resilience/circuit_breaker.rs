//! Circuit breaker middleware.
//!
//! # Responsibilities
//! - Fail fast while the breaker for a dependency is open
//! - Classify every result and report it to the breaker
//! - Hand every admitted response back unchanged, 5xx included
//!
//! # Design Decisions
//! - The breaker is owned by the middleware instance; sharing state between
//!   clients goes through an explicit `Arc<CircuitBreaker>` or `BreakerRegistry`
//! - Rejections by another breaker further down the chain are not counted
//! - A round trip dropped before completion counts as a failure

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};

use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::{Middleware, SharedTransport, Transport, TransportFuture};
use crate::resilience::breaker::{CircuitBreaker, Outcome, Settings};

/// Statuses that count against the dependency: any 5xx, and 429.
pub fn is_failure_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Map a round-trip result onto a breaker outcome.
pub fn classify(result: &Result<Response<Body>>) -> Outcome {
    match result {
        Ok(response) if is_failure_status(response.status()) => Outcome::Failure,
        Ok(_) => Outcome::Success,
        Err(e) if e.is_circuit_rejection() => Outcome::Ignored,
        Err(_) => Outcome::Failure,
    }
}

/// Guards the rest of the chain with a circuit breaker.
#[derive(Clone, Debug)]
pub struct CircuitBreakerMiddleware {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerMiddleware {
    /// A breaker named `name` with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(Settings::new(name))
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::from_breaker(Arc::new(CircuitBreaker::new(settings)))
    }

    /// Reuse an existing breaker, sharing its state.
    pub fn from_breaker(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl Middleware for CircuitBreakerMiddleware {
    fn layer(&self, next: SharedTransport) -> SharedTransport {
        Arc::new(CircuitBreakerTransport {
            breaker: self.breaker.clone(),
            next,
        })
    }
}

struct CircuitBreakerTransport {
    breaker: Arc<CircuitBreaker>,
    next: SharedTransport,
}

impl Transport for CircuitBreakerTransport {
    fn round_trip(&self, request: Request<Body>) -> TransportFuture<'_> {
        Box::pin(async move {
            let permit = match self.breaker.try_acquire() {
                Ok(permit) => permit,
                Err(e) => {
                    metrics::record_circuit_rejection(self.breaker.name());
                    tracing::debug!(
                        cb = %self.breaker.name(),
                        url = %request.uri(),
                        error = %e,
                        "Request rejected by circuit breaker"
                    );
                    return Err(e);
                }
            };

            let result = self.next.round_trip(request).await;
            permit.record(classify(&result));
            result
        })
    }
}
