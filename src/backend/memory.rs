//! In-process backend: dashmap with per-key TTL and lazy expiry.
//!
//! Used by the test suites as the substitutable store and viable for
//! single-node deployments. Counter updates go through the map's entry API,
//! which holds the shard lock for the whole read-modify-write, giving the
//! same per-key atomicity the production store provides.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use crate::error::{CacheError, CacheResult};
use crate::key::key_matches;

use super::{KeyValueBackend, TTL_MISSING, TTL_PERSISTENT};

#[derive(Debug)]
struct StoredEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn counter(value: i64) -> Self {
        Self {
            value: Bytes::from(value.to_string()),
            expires_at: None,
        }
    }

    fn live_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory key-value backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_counter(key: &str, value: &Bytes) -> CacheResult<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| CacheError::decode(key, "stored value is not an integer"))
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.live_at(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        // Expired: reap it once the read guard is released.
        self.entries.remove_if(key, |_, entry| !entry.live_at(now));
        Ok(None)
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Bytes>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.live_at(now)))
    }

    async fn delete_many(&self, keys: &[String]) -> CacheResult<u64> {
        let mut removed = 0u64;
        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str, _batch_hint: usize) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let mut matched: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().live_at(now) && key_matches(entry.key(), pattern))
            .map(|entry| entry.key().clone())
            .collect();
        matched.sort_unstable();
        Ok(matched)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let now = Instant::now();
                let entry = occupied.get();
                if !entry.live_at(now) {
                    occupied.insert(StoredEntry::counter(delta));
                    return Ok(delta);
                }
                let current = parse_counter(key, &entry.value)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::decode(key, "counter overflow"))?;
                let expires_at = entry.expires_at;
                occupied.insert(StoredEntry {
                    value: Bytes::from(next.to_string()),
                    expires_at,
                });
                Ok(next)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(StoredEntry::counter(delta));
                Ok(delta)
            }
        }
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| entry.live_at(now)))
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.live_at(now) {
                return Ok(match entry.expires_at {
                    None => TTL_PERSISTENT,
                    Some(at) => {
                        // The store reports whole seconds, rounded up.
                        let remaining = at.duration_since(now);
                        let mut secs = remaining.as_secs() as i64;
                        if remaining.subsec_nanos() > 0 {
                            secs += 1;
                        }
                        secs
                    }
                });
            }
        }
        Ok(TTL_MISSING)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_and_overwrite() {
        let backend = MemoryBackend::new();
        backend
            .set("story:1", Bytes::from_static(b"alpha"), None)
            .await
            .unwrap();
        assert_eq!(
            backend.get("story:1").await.unwrap(),
            Some(Bytes::from_static(b"alpha"))
        );

        backend
            .set("story:1", Bytes::from_static(b"beta"), None)
            .await
            .unwrap();
        assert_eq!(
            backend.get("story:1").await.unwrap(),
            Some(Bytes::from_static(b"beta"))
        );
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let backend = MemoryBackend::new();
        backend
            .set(
                "system:health",
                Bytes::from_static(b"ok"),
                Some(Duration::from_millis(40)),
            )
            .await
            .unwrap();
        assert!(backend.exists("system:health").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.get("system:health").await.unwrap(), None);
        assert!(!backend.exists("system:health").await.unwrap());
        assert_eq!(backend.ttl("system:health").await.unwrap(), TTL_MISSING);
    }

    #[tokio::test]
    async fn ttl_reports_store_convention() {
        let backend = MemoryBackend::new();
        backend
            .set("user:9", Bytes::from_static(b"{}"), None)
            .await
            .unwrap();
        assert_eq!(backend.ttl("user:9").await.unwrap(), TTL_PERSISTENT);

        backend
            .set(
                "user:10",
                Bytes::from_static(b"{}"),
                Some(Duration::from_secs(600)),
            )
            .await
            .unwrap();
        let remaining = backend.ttl("user:10").await.unwrap();
        assert!((590..=600).contains(&remaining), "remaining = {remaining}");
    }

    #[tokio::test]
    async fn delete_reports_prior_presence() {
        let backend = MemoryBackend::new();
        backend
            .set("media:5", Bytes::from_static(b"{}"), None)
            .await
            .unwrap();
        assert!(backend.delete("media:5").await.unwrap());
        assert!(!backend.delete("media:5").await.unwrap());
    }

    #[tokio::test]
    async fn scan_skips_expired_keys() {
        let backend = MemoryBackend::new();
        backend
            .set("story:1:stats", Bytes::from_static(b"1"), None)
            .await
            .unwrap();
        backend
            .set(
                "story:1:render",
                Bytes::from_static(b"1"),
                Some(Duration::from_millis(30)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let matched = backend.scan("story:1:*", 64).await.unwrap();
        assert_eq!(matched, vec!["story:1:stats".to_string()]);
    }

    #[tokio::test]
    async fn counters_accumulate_and_keep_expiry() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.incr_by("story:1:views", 1).await.unwrap(), 1);
        assert_eq!(backend.incr_by("story:1:views", 4).await.unwrap(), 5);
        assert_eq!(backend.ttl("story:1:views").await.unwrap(), TTL_PERSISTENT);

        backend
            .set(
                "story:2:views",
                Bytes::from_static(b"10"),
                Some(Duration::from_secs(300)),
            )
            .await
            .unwrap();
        assert_eq!(backend.incr_by("story:2:views", -3).await.unwrap(), 7);
        assert!(backend.ttl("story:2:views").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn counter_over_non_integer_is_a_decode_error() {
        let backend = MemoryBackend::new();
        backend
            .set("story:3:views", Bytes::from_static(b"not-a-number"), None)
            .await
            .unwrap();
        let err = backend.incr_by("story:3:views", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    #[tokio::test]
    async fn get_many_preserves_input_order() {
        let backend = MemoryBackend::new();
        backend
            .set("story:1", Bytes::from_static(b"a"), None)
            .await
            .unwrap();
        backend
            .set("story:3", Bytes::from_static(b"c"), None)
            .await
            .unwrap();

        let keys = vec![
            "story:1".to_string(),
            "story:2".to_string(),
            "story:3".to_string(),
        ];
        let values = backend.get_many(&keys).await.unwrap();
        assert_eq!(
            values,
            vec![
                Some(Bytes::from_static(b"a")),
                None,
                Some(Bytes::from_static(b"c")),
            ]
        );
    }
}
