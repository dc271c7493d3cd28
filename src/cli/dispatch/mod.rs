//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let kv_url = matches
        .get_one::<String>("kv-url")
        .cloned()
        .context("missing required argument: --kv-url")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        kv_url,
        frontend_base_url: auth_opts.frontend_base_url,
        access_token_secret: auth_opts.access_token_secret,
        refresh_token_secret: auth_opts.refresh_token_secret,
        reset_token_secret: auth_opts.reset_token_secret,
        access_ttl: auth_opts.access_ttl,
        refresh_ttl: auth_opts.refresh_ttl,
        reset_ttl: auth_opts.reset_ttl,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_action_built_from_flags() -> Result<()> {
        temp_env::with_vars(
            [
                ("INGRESSO_DSN", None::<&str>),
                ("INGRESSO_KV_URL", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec![
                    "ingresso",
                    "--dsn",
                    "postgres://user@localhost:5432/ingresso",
                    "--kv-url",
                    "redis://localhost:6379/0",
                    "--access-token-secret",
                    "a",
                    "--refresh-token-secret",
                    "r",
                    "--reset-token-secret",
                    "p",
                ]);
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 8080);
                assert_eq!(args.kv_url, "redis://localhost:6379/0");
                Ok(())
            },
        )
    }
}
