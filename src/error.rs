//! Error taxonomy shared across the auth core, mapped to HTTP at the
//! handler boundary.
//!
//! Every variant carries a stable machine-readable code so clients can
//! branch on `error.code` instead of parsing messages. `StoreUnavailable`
//! maps to 503 and auth checks fail closed on it: a degraded key-value
//! store never results in an admitted request.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Malformed token")]
    TokenMalformed,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token revoked")]
    TokenRevoked,
    #[error("Refresh token reuse detected")]
    TokenReuseDetected,
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("Invalid or unknown reset token")]
    ResetTokenInvalid,
    #[error("Reset token expired")]
    ResetTokenExpired,
    #[error("Reset token attempts exhausted")]
    ResetTokenExhausted,
    #[error("Backing store unavailable")]
    StoreUnavailable,
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenReuseDetected => "TOKEN_REUSE_DETECTED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ResetTokenInvalid => "RESET_TOKEN_INVALID",
            Self::ResetTokenExpired => "RESET_TOKEN_EXPIRED",
            Self::ResetTokenExhausted => "RESET_TOKEN_EXHAUSTED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::TokenMalformed
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::TokenReuseDetected => StatusCode::UNAUTHORIZED,
            Self::AccountInactive => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ResetTokenInvalid | Self::ResetTokenExpired | Self::ResetTokenExhausted => {
                StatusCode::BAD_REQUEST
            }
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs, not in the response body.
        let message = match &self {
            Self::Internal(err) => {
                tracing::error!("Internal error: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            // Signature and premature-validity failures are reported as
            // malformed to the client; the distinction stays in logs.
            TokenError::Malformed | TokenError::SignatureInvalid | TokenError::NotYetValid => {
                Self::TokenMalformed
            }
        }
    }
}

impl From<crate::kv::KvError> for AuthError {
    fn from(_: crate::kv::KvError) -> Self {
        Self::StoreUnavailable
    }
}
