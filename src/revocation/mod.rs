//! Server-side revocation registry (blacklist).
//!
//! Entries are sentinels keyed by token identifier with TTL equal to the
//! remaining lifetime of the revoked token, so the registry drains itself:
//! an entry disappears at or before the token's natural expiry and
//! correctness never depends on active pruning. Access tokens are revoked
//! by their `session_id`, which kills every outstanding access token of a
//! session in one write.

use std::sync::Arc;
use tracing::debug;

use crate::kv::{KvError, KvStore, keys, unix_now};

const SENTINEL: &str = "1";

#[derive(Clone)]
pub struct RevocationRegistry {
    store: Arc<dyn KvStore>,
}

impl RevocationRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Record `id` as revoked until `expires_at` (unix seconds).
    ///
    /// Revoking an already-expired token is a no-op: an entry with
    /// non-positive TTL would outlive nothing.
    ///
    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn revoke(&self, id: &str, expires_at: u64) -> Result<(), KvError> {
        let now = unix_now();
        if expires_at <= now {
            return Ok(());
        }
        let remaining = std::time::Duration::from_secs(expires_at - now);
        self.store
            .set(&format!("{}{id}", keys::REVOKED), SENTINEL, Some(remaining))
            .await?;
        debug!(id, remaining = remaining.as_secs(), "Token revoked");
        Ok(())
    }

    /// # Errors
    /// Returns [`KvError`] when the store is unreachable. Callers on the
    /// auth path must fail closed on that.
    pub async fn is_revoked(&self, id: &str) -> Result<bool, KvError> {
        self.store.exists(&format!("{}{id}", keys::REVOKED)).await
    }

    /// Defensive reclaim of entries whose TTL the store failed to expire.
    ///
    /// The store normally expires entries on its own; this only exists for
    /// stores whose TTL handling is lazy. Returns the number of entries
    /// still present (live or stale) after the pass.
    ///
    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn sweep(&self) -> Result<usize, KvError> {
        let keys = self.store.scan(keys::REVOKED).await?;
        // Touching each key forces lazy-expiry stores to drop dead entries.
        let mut live = 0;
        for key in &keys {
            if self.store.exists(key).await? {
                live += 1;
            }
        }
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::time::Duration;

    fn registry() -> RevocationRegistry {
        RevocationRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn revoke_then_check_is_true() -> Result<(), KvError> {
        let registry = registry();
        registry.revoke("sess-1", unix_now() + 60).await?;
        assert!(registry.is_revoked("sess-1").await?);
        assert!(!registry.is_revoked("sess-2").await?);
        Ok(())
    }

    #[tokio::test]
    async fn entry_self_expires_without_sweep() -> Result<(), KvError> {
        let registry = registry();
        registry.revoke("sess-1", unix_now() + 1).await?;
        assert!(registry.is_revoked("sess-1").await?);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!registry.is_revoked("sess-1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn revoking_expired_token_is_noop() -> Result<(), KvError> {
        let registry = registry();
        registry.revoke("sess-1", unix_now().saturating_sub(10)).await?;
        assert!(!registry.is_revoked("sess-1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_counts_live_entries() -> Result<(), KvError> {
        let registry = registry();
        registry.revoke("a", unix_now() + 60).await?;
        registry.revoke("b", unix_now() + 60).await?;
        assert_eq!(registry.sweep().await?, 2);
        Ok(())
    }
}
