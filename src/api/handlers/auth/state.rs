//! Auth configuration and shared handler state.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::kv::KvStore;
use crate::rate_limit::{RateLimitConfig, RateLimiter, WindowLimiter};
use crate::recovery::{RecoveryFlow, ResetNotifier};
use crate::revocation::RevocationRegistry;
use crate::session::{SessionManager, refresh::RefreshRotator};
use crate::token::{
    DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, DEFAULT_RESET_TTL, TokenService,
};
use crate::users::CredentialStore;

#[derive(Clone)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    reset_token_secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
    rate_limits: RateLimitConfig,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        frontend_base_url: String,
        access_token_secret: SecretString,
        refresh_token_secret: SecretString,
        reset_token_secret: SecretString,
    ) -> Self {
        Self {
            frontend_base_url,
            access_token_secret,
            refresh_token_secret,
            reset_token_secret,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            reset_ttl: DEFAULT_RESET_TTL,
            rate_limits: RateLimitConfig::default(),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_reset_ttl(mut self, ttl: Duration) -> Self {
        self.reset_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(super) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: Arc<TokenService>,
    sessions: SessionManager,
    rotator: RefreshRotator,
    revocation: RevocationRegistry,
    limiter: Arc<dyn RateLimiter>,
    recovery: RecoveryFlow,
    users: Arc<dyn CredentialStore>,
    store: Arc<dyn KvStore>,
}

impl AuthState {
    /// Wire every auth component onto one key-value store and one
    /// credential store.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn KvStore>,
        users: Arc<dyn CredentialStore>,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        let tokens = Arc::new(
            TokenService::new(
                &config.access_token_secret,
                &config.refresh_token_secret,
                &config.reset_token_secret,
            )
            .with_access_ttl(config.access_ttl)
            .with_refresh_ttl(config.refresh_ttl)
            .with_reset_ttl(config.reset_ttl),
        );
        // Session lifetime tracks the refresh lifetime: while a refresh
        // token could still be exchanged, its session must resolve.
        let sessions = SessionManager::new(Arc::clone(&store), config.refresh_ttl);
        let revocation = RevocationRegistry::new(Arc::clone(&store));
        let rotator = RefreshRotator::new(
            Arc::clone(&tokens),
            sessions.clone(),
            revocation.clone(),
            Arc::clone(&store),
        );
        let limiter: Arc<dyn RateLimiter> = Arc::new(WindowLimiter::new(
            Arc::clone(&store),
            config.rate_limits.clone(),
        ));
        let recovery = RecoveryFlow::new(
            Arc::clone(&store),
            Arc::clone(&users),
            Arc::clone(&tokens),
            Arc::clone(&limiter),
            sessions.clone(),
            revocation.clone(),
            notifier,
        );
        Self {
            config,
            tokens,
            sessions,
            rotator,
            revocation,
            limiter,
            recovery,
            users,
            store,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn rotator(&self) -> &RefreshRotator {
        &self.rotator
    }

    #[must_use]
    pub fn revocation(&self) -> &RevocationRegistry {
        &self.revocation
    }

    pub(crate) fn limiter(&self) -> &dyn RateLimiter {
        self.limiter.as_ref()
    }

    #[must_use]
    pub fn recovery(&self) -> &RecoveryFlow {
        &self.recovery
    }

    pub(crate) fn users(&self) -> &dyn CredentialStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::recovery::LogResetNotifier;
    use crate::users::MemoryCredentialStore;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(
            "https://portal.inst.example".to_string(),
            SecretString::from("a"),
            SecretString::from("r"),
            SecretString::from("p"),
        );
        assert_eq!(config.access_ttl, DEFAULT_ACCESS_TTL);
        assert_eq!(config.refresh_ttl, DEFAULT_REFRESH_TTL);
        assert!(config.cookie_secure());

        let config = config
            .with_access_ttl(Duration::from_secs(60))
            .with_refresh_ttl(Duration::from_secs(120))
            .with_reset_ttl(Duration::from_secs(30));
        assert_eq!(config.access_ttl, Duration::from_secs(60));
        assert_eq!(config.refresh_ttl(), Duration::from_secs(120));
        assert_eq!(config.reset_ttl, Duration::from_secs(30));
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = AuthConfig::new(
            "http://localhost:3000".to_string(),
            SecretString::from("a"),
            SecretString::from("r"),
            SecretString::from("p"),
        );
        assert!(!config.cookie_secure());
    }

    #[tokio::test]
    async fn auth_state_wires_shared_ttls() {
        let config = AuthConfig::new(
            "https://portal.inst.example".to_string(),
            SecretString::from("a"),
            SecretString::from("r"),
            SecretString::from("p"),
        )
        .with_refresh_ttl(Duration::from_secs(3600));
        let state = AuthState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(LogResetNotifier),
        );
        assert_eq!(state.sessions().ttl(), Duration::from_secs(3600));
        assert_eq!(state.tokens().refresh_ttl(), Duration::from_secs(3600));
    }
}
