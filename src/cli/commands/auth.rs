use anyhow::{Context, Result};
use clap::{Arg, Command, builder::ValueParser};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_ACCESS_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_SECRET: &str = "refresh-token-secret";
pub const ARG_RESET_SECRET: &str = "reset-token-secret";

fn duration_parser() -> ValueParser {
    // Accepts humantime syntax: "15m", "7d", "30m", "90s".
    ValueParser::from(|value: &str| -> std::result::Result<Duration, String> {
        humantime::parse_duration(value).map_err(|err| err.to_string())
    })
}

pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    with_ttl_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for CORS and reset links")
                .env("INGRESSO_FRONTEND_BASE_URL")
                .default_value("https://portal.ingresso.dev"),
        )
        .arg(
            Arg::new(ARG_ACCESS_SECRET)
                .long(ARG_ACCESS_SECRET)
                .help("HMAC signing secret for access tokens")
                .env("INGRESSO_ACCESS_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_SECRET)
                .long(ARG_REFRESH_SECRET)
                .help("HMAC signing secret for refresh tokens")
                .env("INGRESSO_REFRESH_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_RESET_SECRET)
                .long(ARG_RESET_SECRET)
                .help("HMAC signing secret for password reset tokens")
                .env("INGRESSO_RESET_TOKEN_SECRET")
                .required(true),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-token-ttl")
                .long("access-token-ttl")
                .help("Access token lifetime (humantime, e.g. 15m)")
                .env("INGRESSO_ACCESS_TOKEN_TTL")
                .default_value("15m")
                .value_parser(duration_parser()),
        )
        .arg(
            Arg::new("refresh-token-ttl")
                .long("refresh-token-ttl")
                .help("Refresh token and session lifetime (humantime, e.g. 7d)")
                .env("INGRESSO_REFRESH_TOKEN_TTL")
                .default_value("7d")
                .value_parser(duration_parser()),
        )
        .arg(
            Arg::new("reset-token-ttl")
                .long("reset-token-ttl")
                .help("Password reset token lifetime (humantime, e.g. 30m)")
                .env("INGRESSO_RESET_TOKEN_TTL")
                .default_value("30m")
                .value_parser(duration_parser()),
        )
}

pub struct Options {
    pub frontend_base_url: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub reset_token_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
}

impl Options {
    /// Extract validated auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error when a required argument is absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let secret = |name: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(name)
                .map(|value| SecretString::from(value.clone()))
                .with_context(|| format!("missing required argument: --{name}"))
        };
        let duration = |name: &str| -> Result<Duration> {
            matches
                .get_one::<Duration>(name)
                .copied()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            access_token_secret: secret(ARG_ACCESS_SECRET)?,
            refresh_token_secret: secret(ARG_REFRESH_SECRET)?,
            reset_token_secret: secret(ARG_RESET_SECRET)?,
            access_ttl: duration("access-token-ttl")?,
            refresh_ttl: duration("refresh-token-ttl")?,
            reset_ttl: duration("reset-token-ttl")?,
        })
    }
}
