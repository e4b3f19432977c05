//! Read-through helper: cache, then the store of record.
//!
//! `get_or_load` is the sequencing contract read handlers follow: consult
//! the cache, on miss run the loader against the store of record and
//! repopulate, and on cache failure bypass the cache entirely. The only
//! errors it returns are the loader's own; the cache can never fail a read.

use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::typed::TypedCache;

const METRIC_DEGRADED_READ: &str = "scorta_cache_degraded_read_total";

/// Where the returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Decoded from the cache.
    Hit,
    /// Loaded from the store of record after a clean miss; repopulation was
    /// attempted.
    Miss,
    /// The cache was unavailable or refused the key; loaded from the store
    /// of record, best-effort repopulation attempted.
    Bypass,
}

/// A loaded value together with its [`ReadSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadThrough<T> {
    pub value: T,
    pub source: ReadSource,
}

/// Resolve a value through the cache, falling back to `loader` on miss or
/// cache failure.
///
/// The loaded value is written back with `ttl` on both the miss and bypass
/// paths; a failed write-back is logged and otherwise ignored, since the
/// value in hand is already correct.
pub async fn get_or_load<T, E, F>(
    cache: &TypedCache,
    namespace: &str,
    parts: &[&str],
    ttl: Option<Duration>,
    loader: F,
) -> Result<ReadThrough<T>, E>
where
    T: Serialize + DeserializeOwned,
    F: AsyncFnOnce() -> Result<T, E>,
{
    let source = match cache.get::<T>(namespace, parts).await {
        Ok(Some(value)) => {
            return Ok(ReadThrough {
                value,
                source: ReadSource::Hit,
            });
        }
        Ok(None) => ReadSource::Miss,
        Err(err) if err.is_misuse() => {
            // A key the codec refuses is a caller bug; surface it loudly but
            // never break the read over it.
            error!(namespace, ?parts, %err, "invalid cache key in read-through; bypassing cache");
            ReadSource::Bypass
        }
        Err(err) => {
            counter!(METRIC_DEGRADED_READ, "namespace" => namespace.to_string()).increment(1);
            warn!(namespace, ?parts, %err, "cache unavailable; falling through to store of record");
            ReadSource::Bypass
        }
    };

    let value = loader().await?;

    match cache.set(namespace, parts, &value, ttl).await {
        Ok(()) => {}
        Err(err) => {
            debug!(namespace, ?parts, %err, "cache repopulation failed; value served from loader");
        }
    }

    Ok(ReadThrough { value, source })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::backend::{KeyValueBackend, MemoryBackend};
    use crate::error::{CacheError, CacheResult};
    use crate::key::ns;
    use crate::store::CacheStore;
    use crate::ttl;

    use super::*;

    fn cache_over(backend: Arc<dyn KeyValueBackend>) -> TypedCache {
        TypedCache::new(CacheStore::new(backend, Duration::from_millis(250), 64))
    }

    struct DownBackend;

    #[async_trait]
    impl KeyValueBackend for DownBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<Bytes>> {
            Err(CacheError::transport("connection refused"))
        }

        async fn get_many(&self, _keys: &[String]) -> CacheResult<Vec<Option<Bytes>>> {
            Err(CacheError::transport("connection refused"))
        }

        async fn set(
            &self,
            _key: &str,
            _value: Bytes,
            _ttl: Option<Duration>,
        ) -> CacheResult<()> {
            Err(CacheError::transport("connection refused"))
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::transport("connection refused"))
        }

        async fn delete_many(&self, _keys: &[String]) -> CacheResult<u64> {
            Err(CacheError::transport("connection refused"))
        }

        async fn scan(&self, _pattern: &str, _batch_hint: usize) -> CacheResult<Vec<String>> {
            Err(CacheError::transport("connection refused"))
        }

        async fn incr_by(&self, _key: &str, _delta: i64) -> CacheResult<i64> {
            Err(CacheError::transport("connection refused"))
        }

        async fn exists(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::transport("connection refused"))
        }

        async fn ttl(&self, _key: &str) -> CacheResult<i64> {
            Err(CacheError::transport("connection refused"))
        }

        async fn ping(&self) -> CacheResult<()> {
            Err(CacheError::transport("connection refused"))
        }
    }

    #[tokio::test]
    async fn miss_loads_and_repopulates() {
        let cache = cache_over(Arc::new(MemoryBackend::new()));
        let loads = AtomicUsize::new(0);

        let first = get_or_load(&cache, ns::STORY, &["s-1"], Some(ttl::ENTITY), async || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>("first-load".to_string())
        })
        .await
        .unwrap();
        assert_eq!(first.source, ReadSource::Miss);
        assert_eq!(first.value, "first-load");

        let second = get_or_load(&cache, ns::STORY, &["s-1"], Some(ttl::ENTITY), async || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>("second-load".to_string())
        })
        .await
        .unwrap();
        assert_eq!(second.source, ReadSource::Hit);
        assert_eq!(second.value, "first-load");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outage_bypasses_cache_without_surfacing_an_error() {
        let cache = cache_over(Arc::new(DownBackend));

        let read = get_or_load(&cache, ns::USER, &["u-1"], Some(ttl::ENTITY), async || {
            Ok::<_, std::convert::Infallible>("from-store-of-record".to_string())
        })
        .await
        .unwrap();
        assert_eq!(read.source, ReadSource::Bypass);
        assert_eq!(read.value, "from-store-of-record");
    }

    #[tokio::test]
    async fn loader_errors_are_the_only_errors() {
        let cache = cache_over(Arc::new(MemoryBackend::new()));

        let err = get_or_load(&cache, ns::STORY, &["s-9"], None, async || {
            Err::<String, _>("store of record down")
        })
        .await
        .unwrap_err();
        assert_eq!(err, "store of record down");
    }

    #[tokio::test]
    async fn invalid_key_bypasses_instead_of_failing_the_read() {
        let cache = cache_over(Arc::new(MemoryBackend::new()));

        let read = get_or_load(&cache, ns::STORY, &["bad:part"], None, async || {
            Ok::<_, std::convert::Infallible>(7u32)
        })
        .await
        .unwrap();
        assert_eq!(read.source, ReadSource::Bypass);
        assert_eq!(read.value, 7);
    }
}
