//! API handlers for the auth service.

pub mod auth;
pub mod health;
pub mod root;

pub use auth::{AuthConfig, AuthState};
