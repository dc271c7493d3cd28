//! Refresh-token rotation with reuse detection.
//!
//! The stored value under `refresh:{user}:{session}` is the single source
//! of truth: exactly one refresh token per `(user, session)` pair is live
//! at any time, and rotation overwrites it, never appends. The overwrite
//! is one atomic `swap` — the commit point of the whole rotation. Request
//! cancellation either happens before the swap (nothing applied) or after
//! it (fully applied); there is no partially-rotated state.

use std::sync::Arc;
use tracing::warn;

use crate::error::AuthError;
use crate::kv::{KvStore, unix_now};
use crate::revocation::RevocationRegistry;
use crate::session::{Session, SessionManager, refresh_key};
use crate::token::TokenService;

#[derive(Debug)]
pub struct RotatedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds, for the response body.
    pub expires_in: u64,
    pub session: Session,
}

#[derive(Clone)]
pub struct RefreshRotator {
    tokens: Arc<TokenService>,
    sessions: SessionManager,
    revocation: RevocationRegistry,
    store: Arc<dyn KvStore>,
}

impl RefreshRotator {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenService>,
        sessions: SessionManager,
        revocation: RevocationRegistry,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            tokens,
            sessions,
            revocation,
            store,
        }
    }

    /// Mint and store the first refresh token of a new session (login).
    ///
    /// # Errors
    /// Returns [`AuthError::StoreUnavailable`] when the store write fails.
    pub async fn install(&self, session: &Session) -> Result<String, AuthError> {
        let (token, _) = self
            .tokens
            .issue_refresh_token(session.user_id, session.session_id, 0)?;
        self.store
            .set(
                &refresh_key(session.user_id, session.session_id),
                &token,
                Some(self.tokens.refresh_ttl()),
            )
            .await?;
        Ok(token)
    }

    /// Exchange a presented refresh token for a fresh access/refresh pair.
    ///
    /// Presenting a token that is not the stored value — typically an
    /// already-rotated one — is treated as a theft signal: the session is
    /// revoked and its state destroyed before the error is returned. Under
    /// concurrent calls with the same valid token, the store's atomic swap
    /// picks exactly one winner; every loser takes the reuse path.
    ///
    /// # Errors
    /// `TokenMalformed`/`TokenExpired` for an unverifiable token,
    /// `TokenRevoked` for a revoked session, `TokenReuseDetected` for a
    /// stale-but-valid token, `StoreUnavailable` on store failure.
    pub async fn rotate(&self, presented: &str) -> Result<RotatedTokens, AuthError> {
        let claims = self.tokens.verify_refresh(presented)?;

        if self
            .revocation
            .is_revoked(&claims.sid.to_string())
            .await?
        {
            return Err(AuthError::TokenRevoked);
        }

        let (next_refresh, _) =
            self.tokens
                .issue_refresh_token(claims.sub, claims.sid, claims.token_version + 1)?;
        let key = refresh_key(claims.sub, claims.sid);
        let previous = self
            .store
            .swap(&key, &next_refresh, self.tokens.refresh_ttl())
            .await?;

        if previous.as_deref() != Some(presented) {
            // Replay of a rotated token, or rotation against a logged-out
            // session. Revoke everything tied to the session; the swap above
            // wrote a token nobody holds, so deleting the key leaves no live
            // refresh token behind.
            warn!(
                user_id = %claims.sub,
                session_id = %claims.sid,
                "Refresh token reuse detected; revoking session"
            );
            self.revocation
                .revoke(
                    &claims.sid.to_string(),
                    unix_now() + self.tokens.refresh_ttl().as_secs(),
                )
                .await?;
            self.sessions.delete(claims.sid).await?;
            self.store.delete(&key).await?;
            return Err(AuthError::TokenReuseDetected);
        }

        let Some(session) = self.sessions.get(claims.sid).await? else {
            // Refresh entry outlived its session record; nothing to extend.
            self.store.delete(&key).await?;
            return Err(AuthError::TokenRevoked);
        };

        let (access_token, access_claims) = self.tokens.issue_access_token(
            session.user_id,
            &session.email,
            &session.role,
            session.org_unit_id,
            session.session_id,
        )?;
        self.sessions.touch(session.session_id).await?;

        Ok(RotatedTokens {
            access_token,
            refresh_token: next_refresh,
            expires_in: access_claims.exp - access_claims.iat,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use secrecy::SecretString;
    use uuid::Uuid;

    struct Harness {
        store: Arc<dyn KvStore>,
        sessions: SessionManager,
        revocation: RevocationRegistry,
        rotator: RefreshRotator,
    }

    fn harness() -> Harness {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenService::new(
            &SecretString::from("access"),
            &SecretString::from("refresh"),
            &SecretString::from("reset"),
        ));
        let sessions = SessionManager::new(Arc::clone(&store), tokens.refresh_ttl());
        let revocation = RevocationRegistry::new(Arc::clone(&store));
        let rotator = RefreshRotator::new(
            Arc::clone(&tokens),
            sessions.clone(),
            revocation.clone(),
            Arc::clone(&store),
        );
        Harness {
            store,
            sessions,
            revocation,
            rotator,
        }
    }

    async fn login(harness: &Harness) -> (Session, String) {
        let session = Session::new(
            Uuid::new_v4(),
            "user@inst.example",
            "member",
            None,
            None,
            None,
        );
        harness.sessions.create(&session).await.expect("session");
        let refresh = harness.rotator.install(&session).await.expect("install");
        (session, refresh)
    }

    #[tokio::test]
    async fn sequential_rotations_accept_only_latest() {
        let harness = harness();
        let (_, first) = login(&harness).await;

        let second = harness.rotator.rotate(&first).await.expect("rotate 1");
        let third = harness
            .rotator
            .rotate(&second.refresh_token)
            .await
            .expect("rotate 2");

        // Any earlier token now trips reuse detection.
        let replay = harness.rotator.rotate(&first).await;
        assert!(matches!(replay, Err(AuthError::TokenReuseDetected)));

        // The reuse response revoked the session, so even the latest token
        // is dead afterwards.
        let after = harness.rotator.rotate(&third.refresh_token).await;
        assert!(matches!(after, Err(AuthError::TokenRevoked)));
    }

    #[tokio::test]
    async fn rotation_extends_session_and_issues_access() {
        let harness = harness();
        let (session, refresh) = login(&harness).await;
        let rotated = harness.rotator.rotate(&refresh).await.expect("rotate");
        assert_eq!(rotated.session.session_id, session.session_id);
        assert!(rotated.expires_in > 0);
        assert_ne!(rotated.refresh_token, refresh);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotations_have_exactly_one_winner() {
        let harness = harness();
        let (_, refresh) = login(&harness).await;
        let rotator = harness.rotator.clone();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rotator = rotator.clone();
            let token = refresh.clone();
            handles.push(tokio::spawn(async move { rotator.rotate(&token).await }));
        }

        let mut successes = 0;
        let mut reuse_or_revoked = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(_) => successes += 1,
                Err(AuthError::TokenReuseDetected | AuthError::TokenRevoked) => {
                    reuse_or_revoked += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(successes <= 1, "two rotations claimed the same token");
        assert_eq!(successes + reuse_or_revoked, 8);
    }

    #[tokio::test]
    async fn rotation_after_logout_is_rejected() {
        let harness = harness();
        let (session, refresh) = login(&harness).await;

        harness
            .sessions
            .purge_user(&harness.revocation, session.user_id)
            .await
            .expect("purge");

        let result = harness.rotator.rotate(&refresh).await;
        assert!(matches!(result, Err(AuthError::TokenRevoked)));
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let harness = harness();
        let result = harness.rotator.rotate("garbage").await;
        assert!(matches!(result, Err(AuthError::TokenMalformed)));
    }

    #[tokio::test]
    async fn reuse_leaves_no_live_refresh_entry() {
        let harness = harness();
        let (session, refresh) = login(&harness).await;
        let _ = harness.rotator.rotate(&refresh).await.expect("rotate");
        let _ = harness.rotator.rotate(&refresh).await.expect_err("reuse");

        let stored = harness
            .store
            .get(&refresh_key(session.user_id, session.session_id))
            .await
            .expect("store");
        assert_eq!(stored, None);
        assert_eq!(
            harness.sessions.get(session.session_id).await.expect("get"),
            None
        );
    }
}
