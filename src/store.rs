//! Shared handle to the backing key-value store.
//!
//! One `CacheStore` is constructed at startup and cloned everywhere a caller
//! needs cache access; every clone shares the same backend connection. Each
//! operation runs under the configured per-operation bound and records its
//! latency, so a slow or unreachable store degrades into a timeout instead of
//! a hung request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::histogram;
use tracing::debug;

use crate::backend::KeyValueBackend;
use crate::error::{CacheError, CacheResult};
use crate::key::KeyPattern;

const METRIC_OP_MS: &str = "scorta_cache_op_ms";

/// Shared, cloneable facade over a [`KeyValueBackend`].
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueBackend>,
    op_timeout: Duration,
    scan_batch: usize,
}

impl CacheStore {
    /// Wrap an already-constructed backend.
    ///
    /// `scan_batch` sizes cursor pages for scans and chunks for bulk deletes.
    pub fn new(backend: Arc<dyn KeyValueBackend>, op_timeout: Duration, scan_batch: usize) -> Self {
        Self {
            backend,
            op_timeout,
            scan_batch: scan_batch.max(1),
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| CacheError::timeout(op, self.op_timeout.as_millis() as u64))?;
        histogram!(METRIC_OP_MS, "op" => op).record(started.elapsed().as_secs_f64() * 1_000.0);
        outcome
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    pub async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.bounded("get", self.backend.get(key)).await
    }

    pub async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Bytes>>> {
        self.bounded("mget", self.backend.get_many(keys)).await
    }

    pub async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()> {
        self.bounded("set", self.backend.set(key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.bounded("del", self.backend.delete(key)).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.bounded("incrby", self.backend.incr_by(key, delta))
            .await
    }

    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.bounded("exists", self.backend.exists(key)).await
    }

    pub async fn ttl(&self, key: &str) -> CacheResult<i64> {
        self.bounded("ttl", self.backend.ttl(key)).await
    }

    /// Liveness probe against the backing store.
    pub async fn ping(&self) -> CacheResult<()> {
        self.bounded("ping", self.backend.ping()).await
    }

    // ========================================================================
    // Pattern deletion
    // ========================================================================

    /// Remove every key matching `pattern`. Returns how many were removed.
    ///
    /// Scan and delete are two separate steps: keys created between them
    /// survive this call. Writers evict after their own mutation commits, so
    /// the window only matters to concurrent writers racing the same pattern,
    /// where last-eviction-wins is acceptable.
    pub async fn delete_pattern(&self, pattern: &KeyPattern) -> CacheResult<u64> {
        let matched = self
            .bounded("scan", self.backend.scan(pattern.as_str(), self.scan_batch))
            .await?;
        if matched.is_empty() {
            return Ok(0);
        }

        let mut removed = 0u64;
        for chunk in matched.chunks(self.scan_batch) {
            removed += self
                .bounded("del", self.backend.delete_many(chunk))
                .await?;
        }
        debug!(
            pattern = pattern.as_str(),
            matched = matched.len(),
            removed,
            "pattern eviction completed"
        );
        Ok(removed)
    }
}
