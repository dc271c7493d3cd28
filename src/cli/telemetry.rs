//! Tracing subscriber setup.
//!
//! Without `-v`, `RUST_LOG` drives filtering and defaults to `error`.
//! With `-v` flags, the crate and the HTTP trace layer log at the mapped
//! level while dependencies stay at `error`.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init(level: Option<tracing::Level>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(format!(
            "error,{}={level},tower_http={level}",
            env!("CARGO_PKG_NAME")
        ))
        .context("Failed to build log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
