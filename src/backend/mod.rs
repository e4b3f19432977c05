//! Backing key-value store abstraction.
//!
//! `CacheStore` talks to the store of cached data through this trait, so the
//! production Redis deployment and the in-process test substitute are
//! interchangeable at construction time. Implementations expose the store's
//! native primitives; key encoding, JSON codec, timeouts, and metrics all
//! live above this seam.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheResult;

mod memory;
mod redis;

pub use memory::MemoryBackend;
pub use redis::RedisBackend;

/// TTL sentinel returned by [`KeyValueBackend::ttl`] for a missing key.
pub const TTL_MISSING: i64 = -2;

/// TTL sentinel returned by [`KeyValueBackend::ttl`] for a persistent key.
pub const TTL_PERSISTENT: i64 = -1;

#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Fetch many keys in one round trip, preserving input order.
    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Bytes>>>;

    /// Store a value, with an expiry when `ttl` is given.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove many keys in one round trip. Returns how many were present.
    async fn delete_many(&self, keys: &[String]) -> CacheResult<u64>;

    /// Collect every live key matching a `*` glob pattern.
    ///
    /// `batch_hint` sizes cursor pages where the store scans incrementally;
    /// the returned set is deduplicated.
    async fn scan(&self, pattern: &str, batch_hint: usize) -> CacheResult<Vec<String>>;

    /// Add `delta` to an integer value, atomically at the store. A missing
    /// key starts from zero; an existing expiry is preserved.
    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining TTL in whole seconds, or [`TTL_PERSISTENT`] /
    /// [`TTL_MISSING`].
    async fn ttl(&self, key: &str) -> CacheResult<i64>;

    /// Liveness probe against the store.
    async fn ping(&self) -> CacheResult<()>;
}
