//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! GET request
//!     → key.rs (fingerprint: url | sorted query | selected headers → sha256 hex)
//!     → store.rs lookup
//!         hit  → record.rs decode → response marked `X-Cache: HIT`, inner chain skipped
//!         miss → inner chain → 2xx → record.rs encode → detached store write
//! ```
//!
//! # Design Decisions
//! - Only GET is cached; everything else passes straight through
//! - Entries expire through the store's TTL, never through a field in the record
//! - Decode and store failures degrade to a live fetch and are only logged
//! - Writes run on a spawned task so caller cancellation cannot abort them

pub mod key;
pub mod middleware;
pub mod record;
pub mod redis;
pub mod store;

use thiserror::Error;

use crate::error::BoxError;

pub use key::CacheKey;
pub use middleware::{CacheConfig, CacheMiddleware, X_CACHE};
pub use record::{CachePolicy, CachedResponse};
pub use redis::{RedisMode, RedisStore, RedisUrl};
pub use store::{CacheStore, MemoryStore, SharedStore, StoreFuture};

/// Failures confined to the cache path.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[source] BoxError),

    #[error("failed to encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode cache entry: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("cache entry is invalid: {0}")]
    Invalid(String),

    #[error("response body is not valid UTF-8")]
    NonUtf8Body,
}

impl CacheError {
    /// Wrap an error raised by a store backend.
    pub fn store(err: impl Into<BoxError>) -> Self {
        CacheError::Store(err.into())
    }
}
