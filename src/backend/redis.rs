//! Redis backend over a multiplexed async connection.
//!
//! The multiplexed connection is the one shared connection the process
//! holds; clones share the underlying channel, so every `CacheStore` clone
//! talks through the same socket. Commands are issued explicitly (`GET`,
//! `SET PX`, `DEL`, `MGET`, `SCAN MATCH COUNT`, `INCRBY`, `EXISTS`, `TTL`,
//! `PING`) to keep the wire shape obvious.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;

use crate::error::{CacheError, CacheResult};

use super::KeyValueBackend;

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::transport(err.to_string())
    }
}

/// Redis-backed implementation of [`KeyValueBackend`].
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl RedisBackend {
    /// Open the endpoint and establish the shared connection, bounded by
    /// `connect_timeout`.
    pub async fn connect(endpoint: &str, connect_timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(endpoint)?;
        let conn = tokio::time::timeout(
            connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CacheError::timeout("connect", connect_timeout.as_millis() as u64))??;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.map(Bytes::from))
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values.into_iter().map(|v| v.map(Bytes::from)).collect())
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(&value[..]);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed.max(0) as u64)
    }

    async fn scan(&self, pattern: &str, batch_hint: usize) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();
        loop {
            let (next, mut page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch_hint)
                .query_async(&mut conn)
                .await?;
            keys.append(&mut page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may yield a key more than once across cursor pages.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let found: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found > 0)
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let remaining: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(remaining)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
