//! Sliding-window rate limiting keyed by caller identity.
//!
//! The store-backed limiter is authoritative: admission counting goes
//! through the key-value store's atomic increment, so concurrent requests
//! for the same identity — on the same instance or across instances —
//! never both read a stale pre-increment count. The in-process limiter is
//! a single-instance fallback guarded by a mutex.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::kv::{KvError, KvStore, keys, unix_now};

/// Scopes with independent budgets. Each scope keys its own counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateScope {
    /// Global per-IP budget across all endpoints.
    Ip,
    /// Login/register/refresh, stricter, per IP or user.
    Auth,
    /// Password-reset requests, per email.
    ResetRequest,
    /// Security-question verification, per reset token.
    QuestionVerify,
}

impl RateScope {
    fn key_part(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Auth => "auth",
            Self::ResetRequest => "reset-request",
            Self::QuestionVerify => "question-verify",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

/// Per-scope budget: at most `limit` admissions per trailing `window`.
#[derive(Clone, Copy, Debug)]
pub struct RateBudget {
    pub limit: i64,
    pub window: Duration,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub ip: RateBudget,
    pub auth: RateBudget,
    pub reset_request: RateBudget,
    pub question_verify: RateBudget,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ip: RateBudget {
                limit: 300,
                window: Duration::from_secs(60),
            },
            auth: RateBudget {
                limit: 10,
                window: Duration::from_secs(60),
            },
            reset_request: RateBudget {
                limit: 1,
                window: Duration::from_secs(5 * 60),
            },
            // Looser than the per-token attempt cap, which must fire first
            // and invalidate the token; this budget only curbs raw volume.
            question_verify: RateBudget {
                limit: 10,
                window: Duration::from_secs(30 * 60),
            },
        }
    }
}

impl RateLimitConfig {
    fn budget(&self, scope: RateScope) -> RateBudget {
        match scope {
            RateScope::Ip => self.ip,
            RateScope::Auth => self.auth,
            RateScope::ResetRequest => self.reset_request,
            RateScope::QuestionVerify => self.question_verify,
        }
    }
}

/// Admission control seam. Errors mean the backing store is degraded;
/// auth callers must fail closed, never treat an error as admission.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(
        &self,
        scope: RateScope,
        identity: &str,
    ) -> Result<RateLimitDecision, KvError>;
}

/// Store-backed limiter: window-aligned counter with TTL.
///
/// The count lives at `ratelimit:{scope}:{identity}:{window_start}` and is
/// bumped with one atomic increment per admission decision — the
/// counter-plus-window-start equivalent of keeping individual timestamps.
pub struct WindowLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl WindowLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl RateLimiter for WindowLimiter {
    async fn allow(
        &self,
        scope: RateScope,
        identity: &str,
    ) -> Result<RateLimitDecision, KvError> {
        let budget = self.config.budget(scope);
        let window_secs = budget.window.as_secs().max(1);
        let window_start = unix_now() / window_secs;
        let key = format!(
            "{}{}:{identity}:{window_start}",
            keys::RATE_LIMIT,
            scope.key_part()
        );
        // TTL of two windows keeps the previous bucket around briefly for
        // debugging while guaranteeing eventual reclaim.
        let count = self.store.incr(&key, budget.window * 2).await?;
        if count <= budget.limit {
            Ok(RateLimitDecision::Allowed)
        } else {
            Ok(RateLimitDecision::Limited)
        }
    }
}

/// In-process sliding-window limiter. Single-instance only: counters are
/// not shared across processes and vanish on restart. Keeps the exact
/// trailing-window semantics by retaining request instants.
pub struct LocalLimiter {
    config: RateLimitConfig,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl LocalLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for LocalLimiter {
    async fn allow(
        &self,
        scope: RateScope,
        identity: &str,
    ) -> Result<RateLimitDecision, KvError> {
        let budget = self.config.budget(scope);
        let now = Instant::now();
        let key = format!("{}:{identity}", scope.key_part());

        // One critical section covers prune, count, and record, so two
        // simultaneous calls cannot both observe the last free slot.
        let mut hits = self.hits.lock().await;
        let bucket = hits.entry(key).or_default();
        bucket.retain(|instant| now.duration_since(*instant) < budget.window);
        if i64::try_from(bucket.len()).unwrap_or(i64::MAX) >= budget.limit {
            return Ok(RateLimitDecision::Limited);
        }
        bucket.push(now);
        Ok(RateLimitDecision::Allowed)
    }
}
