//! Mutex-guarded in-process store.
//!
//! Valid only for a single service instance: state is lost on restart and
//! never shared across instances. The redis-backed store is authoritative
//! in any multi-instance deployment. Also serves as the test backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{KvError, KvStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose TTL has passed. The map is also pruned lazily on
    /// access, so this exists for tests and the periodic sweep only.
    pub async fn prune(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.live());
        before - entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn swap(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, KvError> {
        // Single critical section: read-out and overwrite are indivisible,
        // matching the atomic SET-with-GET semantics of the redis backend.
        let mut entries = self.entries.lock().await;
        let previous = entries
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            )
            .filter(Entry::live)
            .map(|entry| entry.value);
        Ok(previous)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|entry| entry.live()))
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let mut entries = self.entries.lock().await;
        let next = match entries.get(key) {
            Some(entry) if entry.live() => {
                entry.value.parse::<i64>().unwrap_or(0) + 1
            }
            _ => 1,
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.live() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.live())
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn set_get_delete_round_trip() -> Result<(), KvError> {
        let store = MemoryStore::new();
        store.set("k", "v", None).await?;
        assert_eq!(store.get("k").await?, Some("v".to_string()));
        assert!(store.delete("k").await?);
        assert_eq!(store.get("k").await?, None);
        assert!(!store.delete("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn ttl_expiry_hides_entry() -> Result<(), KvError> {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(10)))
            .await?;
        assert!(store.exists("k").await?);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!store.exists("k").await?);
        Ok(())
    }

    #[tokio::test]
    async fn swap_returns_previous_value() -> Result<(), KvError> {
        let store = MemoryStore::new();
        let old = store.swap("k", "first", Duration::from_secs(60)).await?;
        assert_eq!(old, None);
        let old = store.swap("k", "second", Duration::from_secs(60)).await?;
        assert_eq!(old, Some("first".to_string()));
        assert_eq!(store.get("k").await?, Some("second".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn swap_ignores_expired_previous_value() -> Result<(), KvError> {
        let store = MemoryStore::new();
        store
            .set("k", "stale", Some(Duration::from_millis(5)))
            .await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let old = store.swap("k", "fresh", Duration::from_secs(60)).await?;
        assert_eq!(old, None);
        Ok(())
    }

    #[tokio::test]
    async fn incr_counts_and_expires() -> Result<(), KvError> {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c", Duration::from_millis(30)).await?, 1);
        assert_eq!(store.incr("c", Duration::from_millis(30)).await?, 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.incr("c", Duration::from_millis(30)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_incr_never_loses_counts() -> Result<(), KvError> {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.incr("c", Duration::from_secs(60)).await
            }));
        }
        let mut max = 0;
        for handle in handles {
            let count = handle.await.expect("join")?;
            max = max.max(count);
        }
        assert_eq!(max, 20);
        Ok(())
    }

    #[tokio::test]
    async fn scan_filters_by_prefix() -> Result<(), KvError> {
        let store = MemoryStore::new();
        store.set("session:a", "1", None).await?;
        store.set("session:b", "1", None).await?;
        store.set("refresh:a", "1", None).await?;
        let mut keys = store.scan("session:").await?;
        keys.sort();
        assert_eq!(keys, vec!["session:a", "session:b"]);
        Ok(())
    }

    #[tokio::test]
    async fn prune_reclaims_expired_entries() -> Result<(), KvError> {
        let store = MemoryStore::new();
        store
            .set("k1", "v", Some(Duration::from_millis(5)))
            .await?;
        store.set("k2", "v", None).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.prune().await, 1);
        assert!(store.exists("k2").await?);
        Ok(())
    }
}
