//! Session records and their lifecycle in the key-value store.
//!
//! A session is created on login, its TTL slides on every authenticated
//! request, and it is destroyed on logout, expiry, or global logout-all.
//! The session TTL always equals the refresh-token lifetime: as long as a
//! refresh token could still be exchanged, the session it belongs to must
//! still resolve.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::kv::{KvError, KvStore, keys, unix_now};
use crate::revocation::RevocationRegistry;

pub mod refresh;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub org_unit_id: Option<Uuid>,
    pub created_at: u64,
    pub last_activity: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(
        user_id: Uuid,
        email: &str,
        role: &str,
        org_unit_id: Option<Uuid>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        let now = unix_now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            email: email.to_string(),
            role: role.to_string(),
            org_unit_id,
            created_at: now,
            last_activity: now,
            ip_address,
            user_agent,
        }
    }
}

fn session_key(session_id: Uuid) -> String {
    format!("{}{session_id}", keys::SESSION)
}

pub(crate) fn refresh_key(user_id: Uuid, session_id: Uuid) -> String {
    format!("{}{user_id}:{session_id}", keys::REFRESH)
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist a new session with TTL = refresh lifetime.
    ///
    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn create(&self, session: &Session) -> Result<(), KvError> {
        let json = serde_json::to_string(session)
            .map_err(|err| KvError::Unavailable(err.to_string()))?;
        self.store
            .set(&session_key(session.session_id), &json, Some(self.ttl))
            .await?;
        debug!(session_id = %session.session_id, user_id = %session.user_id, "Session created");
        Ok(())
    }

    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn get(&self, session_id: Uuid) -> Result<Option<Session>, KvError> {
        let Some(json) = self.store.get(&session_key(session_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                // An unreadable record is treated as absent; it will expire.
                warn!(%session_id, "Discarding undecodable session record: {err}");
                Ok(None)
            }
        }
    }

    /// Sliding expiration: refresh `last_activity` and reset the TTL.
    /// Called on every successful authenticated request, not only refresh.
    ///
    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn touch(&self, session_id: Uuid) -> Result<(), KvError> {
        let Some(mut session) = self.get(session_id).await? else {
            return Ok(());
        };
        session.last_activity = unix_now();
        let json = serde_json::to_string(&session)
            .map_err(|err| KvError::Unavailable(err.to_string()))?;
        self.store
            .set(&session_key(session_id), &json, Some(self.ttl))
            .await
    }

    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn delete(&self, session_id: Uuid) -> Result<(), KvError> {
        self.store.delete(&session_key(session_id)).await?;
        Ok(())
    }

    /// All live session ids belonging to `user_id`.
    ///
    /// Full scan filtered by the `user_id` field: O(total sessions). Fine
    /// at portal scale; a larger deployment should maintain a per-user
    /// secondary index instead.
    ///
    /// # Errors
    /// Returns [`KvError`] when the store is unreachable.
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, KvError> {
        let mut sessions = Vec::new();
        for key in self.store.scan(keys::SESSION).await? {
            let Some(json) = self.store.get(&key).await? else {
                continue;
            };
            if let Ok(session) = serde_json::from_str::<Session>(&json) {
                if session.user_id == user_id {
                    sessions.push(session.session_id);
                }
            }
        }
        Ok(sessions)
    }

    /// Global logout: revoke and destroy every session of `user_id`.
    ///
    /// Ordering matters: each session id is written to the revocation
    /// registry *before* its session and refresh entries are deleted, so an
    /// access token concurrently in flight is rejected rather than racing a
    /// half-deleted session. Requests that already passed verification
    /// before the revocation write may still complete (short grace window).
    ///
    /// # Errors
    /// Returns [`AuthError::StoreUnavailable`] when the store is unreachable.
    pub async fn purge_user(
        &self,
        revocation: &RevocationRegistry,
        user_id: Uuid,
    ) -> Result<usize, AuthError> {
        let session_ids = self.list_by_user(user_id).await?;
        let horizon = unix_now() + self.ttl.as_secs();
        for &session_id in &session_ids {
            // Revoke first, then delete state.
            revocation.revoke(&session_id.to_string(), horizon).await?;
            self.delete(session_id).await?;
            self.store
                .delete(&refresh_key(user_id, session_id))
                .await?;
        }
        if !session_ids.is_empty() {
            debug!(%user_id, count = session_ids.len(), "Purged user sessions");
        }
        Ok(session_ids.len())
    }
}
