//! Auth handlers and supporting modules.
//!
//! This module coordinates registration, password login, token refresh
//! with rotation, bearer verification, logout, and the security-question
//! password recovery flow. All stateful collaborators hang off one
//! [`AuthState`] shared through an axum `Extension`.
//!
//! ## Token handling
//!
//! Access tokens travel only in the `Authorization: Bearer` header.
//! Refresh tokens travel in an `HttpOnly` cookie for browser clients and
//! may be carried in the request body by API clients; the body wins when
//! both are present.

pub(crate) mod login;
pub(crate) mod recovery;
pub(crate) mod refresh;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
