//! Redis-backed store. Authoritative in multi-instance deployments.
//!
//! Rotation relies on `SET ... GET EX` being a single atomic command and
//! rate counters on `INCR` inside a MULTI/EXEC pair; both hold for a
//! single redis node, which is the deployment target here.

use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use async_trait::async_trait;

use super::{DEFAULT_TIMEOUT, KvError, KvStore};

pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    /// Connect to redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    /// Returns [`KvError::Unavailable`] when the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client =
            redis::Client::open(url).map_err(|err| KvError::Unavailable(err.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|err| KvError::Unavailable(err.to_string()))?;
        debug!("Connected to key-value store");
        Ok(Self {
            connection,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>> + Send,
    ) -> Result<T, KvError> {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(KvError::Unavailable(err.to_string())),
            Err(_) => Err(KvError::Timeout(self.timeout)),
        }
    }
}

/// Redis rejects `EX 0`; clamp to one second for sub-second TTLs.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.connection.clone();
        self.call(async move { redis::cmd("GET").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_seconds(ttl));
        }
        self.call(async move { cmd.query_async(&mut conn).await })
            .await
    }

    async fn swap(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, KvError> {
        // SET with GET returns the previous value in the same atomic step.
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("GET")
            .arg("EX")
            .arg(ttl_seconds(ttl));
        self.call(async move { cmd.query_async(&mut conn).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .call(async move { redis::cmd("DEL").arg(key).query_async(&mut conn).await })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.connection.clone();
        self.call(async move { redis::cmd("EXISTS").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .ignore();
        let (count,): (i64,) = self
            .call(async move { pipe.query_async(&mut conn).await })
            .await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.connection.clone();
        let set: i64 = self
            .call(async move {
                redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_seconds(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(set > 0)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.connection.clone();
        let pattern = format!("{prefix}*");
        self.call(async move {
            let mut keys = Vec::new();
            let mut iter = redis::cmd("SCAN")
                .cursor_arg(0)
                .arg("MATCH")
                .arg(&pattern)
                .clone()
                .iter_async::<String>(&mut conn)
                .await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok(keys)
        })
        .await
    }
}
