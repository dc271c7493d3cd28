use crate::{
    api,
    api::handlers::auth::{AuthConfig, AuthState},
    kv::{KvStore, RedisStore},
    recovery::LogResetNotifier,
    users::{CredentialStore, PgCredentialStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub kv_url: String,
    pub frontend_base_url: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub reset_token_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database or key-value store is unreachable, or
/// the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let store: Arc<dyn KvStore> = Arc::new(
        RedisStore::connect(&args.kv_url)
            .await
            .context("Failed to connect to key-value store")?,
    );
    info!("Connected to key-value store");

    let users: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));

    let config = AuthConfig::new(
        args.frontend_base_url,
        args.access_token_secret,
        args.refresh_token_secret,
        args.reset_token_secret,
    )
    .with_access_ttl(args.access_ttl)
    .with_refresh_ttl(args.refresh_ttl)
    .with_reset_ttl(args.reset_ttl);

    let auth_state = Arc::new(AuthState::new(
        config,
        store,
        users,
        Arc::new(LogResetNotifier),
    ));

    api::serve(args.port, auth_state).await
}
