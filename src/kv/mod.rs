//! Key-value store abstraction shared by sessions, refresh rotation,
//! revocation, rate limiting, and password recovery.
//!
//! The store is the only cross-request shared state: multiple service
//! instances behind a load balancer coordinate exclusively through it.
//! Every call carries a timeout and surfaces [`KvError::Unavailable`]
//! instead of hanging; callers on the auth path treat that as a hard
//! failure (fail closed).

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Logical partitions, expressed as key prefixes.
pub mod keys {
    pub const SESSION: &str = "session:";
    pub const REFRESH: &str = "refresh:";
    pub const REVOKED: &str = "revoked:";
    pub const RATE_LIMIT: &str = "ratelimit:";
    pub const RESET: &str = "reset:";
}

/// Default timeout applied to every store call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
    #[error("key-value store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Store operations the auth core depends on.
///
/// `swap` and `incr` are the two atomic primitives the correctness
/// invariants lean on: refresh rotation commits through a single `swap`,
/// and rate-limit admission counts through a single `incr`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Write `value` under `key`. `ttl = None` leaves the key persistent.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Atomically overwrite `key` with `value` (and `ttl`), returning the
    /// previous value. This is a single store round-trip, never a
    /// read-modify-write sequence.
    async fn swap(&self, key: &str, value: &str, ttl: Duration)
        -> Result<Option<String>, KvError>;

    /// Delete `key`, reporting whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically increment the counter at `key`, applying `ttl` so the
    /// counter expires with its window. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError>;

    /// Reset the TTL of an existing key. Returns false when the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// List keys under `prefix`. O(total keys in the store); acceptable at
    /// portal scale, documented at the call sites that depend on it.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
