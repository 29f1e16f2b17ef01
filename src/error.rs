//! Error types shared by the transport pipeline and the client facade.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error used for transport and body failures coming from below the pipeline.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Every failure a caller can observe from the pipeline or the facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The outbound request could not be assembled.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    /// The target URL could not be parsed.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network or connection-level failure from the base transport.
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    /// Reading a response body failed.
    #[error("failed to read response body: {0}")]
    Body(#[source] BoxError),

    /// The named breaker is open and rejected the call without touching the network.
    #[error("circuit breaker `{name}` is open")]
    CircuitOpen { name: String },

    /// The named breaker is half-open and all trial slots are taken.
    #[error("circuit breaker `{name}` is half-open and at its trial request limit")]
    TooManyTrialRequests { name: String },

    /// The whole round trip exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response carried no body to decode.
    #[error("response body is empty (status {status})")]
    EmptyBody { status: StatusCode },

    /// The response body was not valid JSON.
    #[error("failed to decode response body (status {status}): {source}")]
    Decode {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Wrap any transport-level error.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        ClientError::Transport(err.into())
    }

    /// True when a circuit breaker refused the call before it reached the network.
    pub fn is_circuit_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::CircuitOpen { .. } | ClientError::TooManyTrialRequests { .. }
        )
    }

    /// True for failures to decode the response body, as opposed to transport problems.
    pub fn is_decode(&self) -> bool {
        matches!(self, ClientError::EmptyBody { .. } | ClientError::Decode { .. })
    }
}
