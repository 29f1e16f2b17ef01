//! Key-value store boundary for cached responses.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::cache::CacheError;

/// Future returned by store operations.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, CacheError>>;

/// Minimal get/set store with store-side expiration.
///
/// Implemented in-process by [`MemoryStore`] and over the network by
/// [`RedisStore`](crate::cache::RedisStore).
pub trait CacheStore: Send + Sync {
    /// Fetch a value; `None` when absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Store a value that the store expires after `ttl`. A zero TTL never expires.
    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()>;
}

/// A store shared between middlewares.
pub type SharedStore = Arc<dyn CacheStore>;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Time left before `key` expires. `None` when absent, expired, or stored without expiry.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.inner.get(key)?;
        let expires_at = entry.expires_at?;
        (expires_at > now).then(|| expires_at - now)
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.inner.len())
    }

    fn get_now(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let found = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if found {
            self.inner.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }
}

impl CacheStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.get_now(key)) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
            self.inner
                .insert(key.to_string(), Entry { value, expires_at });
            Ok(())
        })
    }
}
