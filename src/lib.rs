//! # Ingresso (Credential & Session Authority)
//!
//! `ingresso` issues, validates, rotates, and revokes credentials for a
//! multi-tenant organizational web portal. It owns the authentication and
//! session lifecycle: short-lived signed access tokens paired with
//! long-lived rotating refresh tokens, a store-backed revocation registry,
//! sliding-window rate limiting, and a password-recovery flow gated by
//! knowledge-based security questions.
//!
//! ## Token Model
//!
//! Three token classes (access, refresh, password-reset) are signed with
//! distinct keys and carry distinct audience values, so a token minted for
//! one purpose can never be presented as another. Access tokens are
//! stateless and verified offline; refresh tokens are additionally checked
//! against the server-side copy and rotated on every use. Presenting an
//! already-rotated refresh token is treated as a theft signal: the whole
//! session is revoked.
//!
//! ## Shared State
//!
//! All cross-request coordination (sessions, refresh rotation, revocation,
//! rate counters) goes through a shared key-value store so that multiple
//! service instances behind a load balancer stay consistent. In-process
//! fallbacks exist for single-instance deployments and tests, and are
//! documented as such.
//!
//! > **Warning:** Rotating a signing key invalidates every outstanding token
//! > of that class across the cluster.

pub mod api;
pub mod cli;
pub mod error;
pub mod kv;
pub mod rate_limit;
pub mod recovery;
pub mod revocation;
pub mod session;
pub mod token;
pub mod users;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
