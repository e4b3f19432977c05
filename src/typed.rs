//! Typed cache API over JSON payloads.
//!
//! `TypedCache` is what call sites hold: keys are built (and validated)
//! from `(namespace, parts)`, values are serde-encoded JSON, and hit/miss
//! accounting is labeled by namespace. A payload that no longer decodes is
//! logged and served as a miss, so a shape change between deployments costs
//! one reload instead of a failed request.

use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::key::{CacheKey, KeyPattern};
use crate::store::CacheStore;
use crate::ttl::KeyTtl;

const METRIC_HIT: &str = "scorta_cache_hit_total";
const METRIC_MISS: &str = "scorta_cache_miss_total";
const METRIC_DECODE_FAILURE: &str = "scorta_cache_decode_failure_total";
const METRIC_EVICTED: &str = "scorta_cache_evicted_keys_total";

/// Typed read/write surface over a [`CacheStore`].
#[derive(Clone)]
pub struct TypedCache {
    store: CacheStore,
}

impl TypedCache {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn decode<T: DeserializeOwned>(key: &str, raw: &Bytes) -> CacheResult<T> {
        serde_json::from_slice(raw).map_err(|err| CacheError::decode(key, err.to_string()))
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> CacheResult<Bytes> {
        let encoded = serde_json::to_vec(value)
            .map_err(|err| CacheError::misuse(format!("value for `{key}` failed to serialize: {err}")))?;
        Ok(Bytes::from(encoded))
    }

    // ========================================================================
    // Single-key operations
    // ========================================================================

    /// Fetch and decode a cached value. `Ok(None)` is a miss, never an error;
    /// a stored payload that fails to decode is counted, logged at warn, and
    /// served as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        parts: &[&str],
    ) -> CacheResult<Option<T>> {
        let key = CacheKey::new(namespace, parts)?;
        let Some(raw) = self.store.get(key.as_str()).await? else {
            counter!(METRIC_MISS, "namespace" => namespace.to_string()).increment(1);
            return Ok(None);
        };
        match Self::decode(key.as_str(), &raw) {
            Ok(value) => {
                counter!(METRIC_HIT, "namespace" => namespace.to_string()).increment(1);
                Ok(Some(value))
            }
            Err(err) => {
                counter!(METRIC_DECODE_FAILURE, "namespace" => namespace.to_string()).increment(1);
                warn!(key = key.as_str(), %err, "cached payload failed to decode; treating as miss");
                Ok(None)
            }
        }
    }

    /// Store a value, with an expiry when `ttl` is given. A zero TTL is
    /// misuse; omit it for a persistent entry.
    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        parts: &[&str],
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let key = CacheKey::new(namespace, parts)?;
        if ttl == Some(Duration::ZERO) {
            return Err(CacheError::misuse(format!(
                "ttl for `{key}` must be positive; omit it for no expiry"
            )));
        }
        let encoded = Self::encode(key.as_str(), value)?;
        self.store.set(key.as_str(), encoded, ttl).await
    }

    /// Remove one key. Evicting a key that does not exist succeeds.
    pub async fn evict(&self, namespace: &str, parts: &[&str]) -> CacheResult<()> {
        let key = CacheKey::new(namespace, parts)?;
        if self.store.delete(key.as_str()).await? {
            counter!(METRIC_EVICTED, "namespace" => namespace.to_string()).increment(1);
        }
        Ok(())
    }

    pub async fn exists(&self, namespace: &str, parts: &[&str]) -> CacheResult<bool> {
        let key = CacheKey::new(namespace, parts)?;
        self.store.exists(key.as_str()).await
    }

    pub async fn ttl_remaining(&self, namespace: &str, parts: &[&str]) -> CacheResult<KeyTtl> {
        let key = CacheKey::new(namespace, parts)?;
        let secs = self.store.ttl(key.as_str()).await?;
        Ok(KeyTtl::from_store_secs(secs))
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Add `amount` to a counter key, atomically at the backing store, and
    /// return the new value. A missing key starts from zero.
    pub async fn increment(
        &self,
        namespace: &str,
        parts: &[&str],
        amount: i64,
    ) -> CacheResult<i64> {
        let key = CacheKey::new(namespace, parts)?;
        self.store.incr_by(key.as_str(), amount).await
    }

    /// Subtract `amount` from a counter key and return the new value.
    pub async fn decrement(
        &self,
        namespace: &str,
        parts: &[&str],
        amount: i64,
    ) -> CacheResult<i64> {
        let key = CacheKey::new(namespace, parts)?;
        self.store.incr_by(key.as_str(), -amount).await
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Fetch many keys under one namespace in a single round trip.
    ///
    /// The result preserves input order; each slot is `None` on miss or
    /// decode failure.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        namespace: &str,
        parts_lists: &[&[&str]],
    ) -> CacheResult<Vec<Option<T>>> {
        let mut keys = Vec::with_capacity(parts_lists.len());
        for parts in parts_lists {
            keys.push(CacheKey::new(namespace, parts)?.into_string());
        }
        let raws = self.store.get_many(&keys).await?;

        let mut values = Vec::with_capacity(raws.len());
        for (key, raw) in keys.iter().zip(raws) {
            let Some(raw) = raw else {
                counter!(METRIC_MISS, "namespace" => namespace.to_string()).increment(1);
                values.push(None);
                continue;
            };
            match Self::decode(key, &raw) {
                Ok(value) => {
                    counter!(METRIC_HIT, "namespace" => namespace.to_string()).increment(1);
                    values.push(Some(value));
                }
                Err(err) => {
                    counter!(METRIC_DECODE_FAILURE, "namespace" => namespace.to_string())
                        .increment(1);
                    warn!(key = key.as_str(), %err, "cached payload failed to decode; treating as miss");
                    values.push(None);
                }
            }
        }
        Ok(values)
    }

    /// Remove every key matching a validated pattern. Returns the number of
    /// keys removed; zero when nothing matched.
    pub async fn evict_pattern(&self, pattern: &KeyPattern) -> CacheResult<u64> {
        let removed = self.store.delete_pattern(pattern).await?;
        if removed > 0 {
            counter!(METRIC_EVICTED, "namespace" => "pattern".to_string()).increment(removed);
        }
        Ok(removed)
    }
}
