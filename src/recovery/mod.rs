//! Password recovery gated by knowledge-based security questions.
//!
//! The flow is a small state machine persisted in the key-value store:
//!
//! `Requested → EmailSent → AwaitingSecurityAnswer → Confirmed`
//!
//! with `Expired` (TTL ran out) and `Failed` (attempts exhausted) as
//! terminal branches. The client-facing reset token is a signed token of
//! the dedicated reset class; its `jti` (32 random bytes, 64 hex chars)
//! keys the persisted record, so possession of the token alone proves
//! nothing once the record is used, expired, or failed.
//!
//! Requesting a reset always reports success, whether or not the email
//! exists — the flow never confirms account existence.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::kv::{KvStore, keys, unix_now};
use crate::rate_limit::{RateLimitDecision, RateLimiter, RateScope};
use crate::revocation::RevocationRegistry;
use crate::session::SessionManager;
use crate::token::TokenService;
use crate::users::{CredentialStore, password};

/// Attempts allowed against the security questions of one reset token.
pub const MAX_ATTEMPTS: i64 = 3;

/// Delivery collaborator for minted reset tokens. Production wires an
/// email sender; the default logs the dispatch without the token value.
pub trait ResetNotifier: Send + Sync {
    fn deliver(&self, email: &str, token: &str);
}

pub struct LogResetNotifier;

impl ResetNotifier for LogResetNotifier {
    fn deliver(&self, email: &str, _token: &str) {
        // The token itself never reaches the logs.
        info!(email, "Password reset token dispatched");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetState {
    Requested,
    EmailSent,
    AwaitingSecurityAnswer,
    Confirmed,
    Expired,
    Failed,
}

/// Persisted reset record, keyed by the reset token's `jti`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResetRecord {
    user_id: Uuid,
    email: String,
    state: ResetState,
    created_at: u64,
    expires_at: u64,
    used_at: Option<u64>,
    request_ip: Option<String>,
    question_verified: bool,
}

impl ResetRecord {
    fn remaining(&self) -> Option<Duration> {
        let now = unix_now();
        (self.expires_at > now).then(|| Duration::from_secs(self.expires_at - now))
    }
}

fn record_key(jti: &str) -> String {
    format!("{}{jti}", keys::RESET)
}

fn attempts_key(jti: &str) -> String {
    format!("{}attempts:{jti}", keys::RESET)
}

pub struct RecoveryFlow {
    store: Arc<dyn KvStore>,
    users: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    limiter: Arc<dyn RateLimiter>,
    sessions: SessionManager,
    revocation: RevocationRegistry,
    notifier: Arc<dyn ResetNotifier>,
}

impl RecoveryFlow {
    #[must_use]
    pub fn new(
        store: Arc<dyn KvStore>,
        users: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        limiter: Arc<dyn RateLimiter>,
        sessions: SessionManager,
        revocation: RevocationRegistry,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        Self {
            store,
            users,
            tokens,
            limiter,
            sessions,
            revocation,
            notifier,
        }
    }

    /// Start a reset for `email`. Always succeeds from the caller's point
    /// of view; a token is minted and dispatched only when the account
    /// exists and is active.
    ///
    /// # Errors
    /// `RateLimitExceeded` for repeated requests within the per-email
    /// window, `StoreUnavailable` on store failure.
    pub async fn request(&self, email: &str, request_ip: Option<String>) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();
        if self
            .limiter
            .allow(RateScope::ResetRequest, &email)
            .await?
            == RateLimitDecision::Limited
        {
            return Err(AuthError::RateLimitExceeded);
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            // Indistinguishable from the success path for the caller.
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        let (token, claims) = self.tokens.issue_reset_token(user.id, &email)?;
        let record = ResetRecord {
            user_id: user.id,
            email: email.clone(),
            state: ResetState::Requested,
            created_at: claims.iat,
            expires_at: claims.exp,
            used_at: None,
            request_ip,
            question_verified: false,
        };
        self.put(&claims.jti, &record).await?;

        self.notifier.deliver(&email, &token);
        self.transition(&claims.jti, record, ResetState::EmailSent)
            .await?;
        Ok(())
    }

    /// Check one security-question answer against the stored hash.
    ///
    /// The attempt counter increments on every call, success or failure,
    /// and the token is force-invalidated once the cap is hit — a correct
    /// answer on attempt four is worthless.
    ///
    /// # Errors
    /// `ResetTokenInvalid`/`ResetTokenExpired` for an unusable token,
    /// `ResetTokenExhausted` once attempts are used up,
    /// `RateLimitExceeded` per the per-token budget,
    /// `InvalidCredentials` for a wrong answer.
    pub async fn verify_security_question(
        &self,
        token: &str,
        question_id: Uuid,
        answer: &str,
    ) -> Result<(), AuthError> {
        let claims = self.verify_token(token)?;
        if self
            .limiter
            .allow(RateScope::QuestionVerify, &claims.jti)
            .await?
            == RateLimitDecision::Limited
        {
            return Err(AuthError::RateLimitExceeded);
        }

        let record = self.load_usable(&claims.jti).await?;
        let ttl = record
            .remaining()
            .ok_or(AuthError::ResetTokenExpired)?;

        let attempts = self.store.incr(&attempts_key(&claims.jti), ttl).await?;
        if attempts > MAX_ATTEMPTS {
            warn!(user_id = %record.user_id, "Reset token attempts exhausted");
            // The record stays until its TTL so the terminal state remains
            // observable; `load_usable` refuses Failed records from here on.
            self.transition(&claims.jti, record, ResetState::Failed)
                .await?;
            return Err(AuthError::ResetTokenExhausted);
        }

        let answers = self.users.security_answers(record.user_id).await?;
        let stored = answers
            .iter()
            .find(|candidate| candidate.is_active && candidate.question_id == question_id);

        let matched = match stored {
            Some(stored) => {
                password::verify_blocking(normalize_answer(answer), stored.answer_hash.clone())
                    .await?
            }
            // Unknown question id burns an attempt like any wrong answer.
            None => false,
        };

        let mut record = record;
        record.state = ResetState::AwaitingSecurityAnswer;
        if matched {
            record.question_verified = true;
        }
        self.put(&claims.jti, &record).await?;

        if matched {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Complete the reset: set the new password and revoke every
    /// outstanding credential of the user.
    ///
    /// The commit point is a single atomic swap marking the record used;
    /// a concurrent second confirm observes an already-used record and
    /// fails, so a token is consumed at most once.
    ///
    /// # Errors
    /// `ResetTokenInvalid`/`ResetTokenExpired` for an unusable token or an
    /// unverified security question, `ValidationFailed` when the new
    /// password violates policy, `StoreUnavailable` on store failure.
    pub async fn confirm(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let claims = self.verify_token(token)?;
        let record = self.load_usable(&claims.jti).await?;
        let ttl = record
            .remaining()
            .ok_or(AuthError::ResetTokenExpired)?;
        if !record.question_verified {
            return Err(AuthError::ResetTokenInvalid);
        }

        if let Err(violations) = password::validate_password(new_password) {
            return Err(AuthError::ValidationFailed(violations.join("; ")));
        }

        let mut used = record;
        used.used_at = Some(unix_now());
        used.state = ResetState::Confirmed;
        let json = serde_json::to_string(&used).map_err(anyhow::Error::from)?;
        let previous = self.store.swap(&record_key(&claims.jti), &json, ttl).await?;
        let still_usable = previous
            .as_deref()
            .and_then(|json| serde_json::from_str::<ResetRecord>(json).ok())
            .is_some_and(|prior| prior.used_at.is_none());
        if !still_usable {
            // Lost the race against another confirm; nothing was applied.
            return Err(AuthError::ResetTokenInvalid);
        }

        let password_hash = password::hash_blocking(new_password.to_string()).await?;
        self.users
            .update_password_hash(used.user_id, &password_hash)
            .await?;

        // A reset invalidates every outstanding credential, not just the
        // session that asked for it.
        let purged = self
            .sessions
            .purge_user(&self.revocation, used.user_id)
            .await?;
        info!(user_id = %used.user_id, sessions = purged, "Password reset confirmed");
        Ok(())
    }

    /// Observed state of a reset token, mainly for diagnostics and tests.
    ///
    /// # Errors
    /// `StoreUnavailable` on store failure.
    pub async fn state(&self, token: &str) -> Result<ResetState, AuthError> {
        let claims = match self.verify_token(token) {
            Ok(claims) => claims,
            Err(AuthError::ResetTokenExpired) => return Ok(ResetState::Expired),
            Err(err) => return Err(err),
        };
        match self.load(&claims.jti).await? {
            Some(record) if record.remaining().is_none() => Ok(ResetState::Expired),
            Some(record) => Ok(record.state),
            None => Ok(ResetState::Expired),
        }
    }

    fn verify_token(&self, token: &str) -> Result<crate::token::ResetClaims, AuthError> {
        self.tokens.verify_reset(token).map_err(|err| match err {
            crate::token::TokenError::Expired => AuthError::ResetTokenExpired,
            _ => AuthError::ResetTokenInvalid,
        })
    }

    async fn load(&self, jti: &str) -> Result<Option<ResetRecord>, AuthError> {
        let Some(json) = self.store.get(&record_key(jti)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&json).ok())
    }

    /// Load a record that can still advance: present and not yet used.
    async fn load_usable(&self, jti: &str) -> Result<ResetRecord, AuthError> {
        let record = self.load(jti).await?.ok_or(AuthError::ResetTokenInvalid)?;
        if record.used_at.is_some()
            || matches!(record.state, ResetState::Confirmed | ResetState::Failed)
        {
            return Err(AuthError::ResetTokenInvalid);
        }
        Ok(record)
    }

    async fn put(&self, jti: &str, record: &ResetRecord) -> Result<(), AuthError> {
        let ttl = record.remaining().ok_or(AuthError::ResetTokenExpired)?;
        let json = serde_json::to_string(record).map_err(anyhow::Error::from)?;
        self.store
            .set(&record_key(jti), &json, Some(ttl))
            .await?;
        Ok(())
    }

    async fn transition(
        &self,
        jti: &str,
        mut record: ResetRecord,
        state: ResetState,
    ) -> Result<(), AuthError> {
        record.state = state;
        self.put(jti, &record).await
    }
}

fn normalize_answer(answer: &str) -> String {
    // Enrollment stores hashes of normalized answers; comparison must match.
    answer.trim().to_lowercase()
}
