//! Signed-token minting and verification.
//!
//! Three token classes (access, refresh, password-reset) use distinct
//! signing keys and distinct audience values. Compromise of one class's
//! key never allows forging another class, and a token minted for one
//! purpose is rejected when presented as another.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::kv::unix_now;

pub const ISSUER: &str = "ingresso";
pub const AUDIENCE_ACCESS: &str = "ingresso:access";
pub const AUDIENCE_REFRESH: &str = "ingresso:refresh";
pub const AUDIENCE_RESET: &str = "ingresso:password-reset";

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_RESET_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token signature invalid")]
    SignatureInvalid,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            // Wrong audience/issuer means the token was minted for another
            // purpose; it is not a valid token of the expected class.
            _ => Self::Malformed,
        }
    }
}

/// Claims carried by a short-lived access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub org_unit_id: Option<Uuid>,
    pub sid: Uuid,
    pub jti: Uuid,
    pub iat: u64,
    pub exp: u64,
    pub nbf: u64,
    pub iss: String,
    pub aud: String,
}

/// Minimal claim set for a refresh token. The server-side stored copy is
/// authoritative; these claims only identify which slot to check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub token_version: u32,
    pub jti: Uuid,
    pub iat: u64,
    pub exp: u64,
    pub nbf: u64,
    pub iss: String,
    pub aud: String,
}

/// Claims for a password-reset token. `jti` doubles as the lookup key for
/// the persisted reset record (64 hex chars).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: Uuid,
    pub email: String,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
    pub nbf: u64,
    pub iss: String,
    pub aud: String,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    reset: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenService {
    /// Build a service from three independent signing secrets.
    #[must_use]
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        reset_secret: &SecretString,
    ) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            reset: KeyPair::from_secret(reset_secret),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            reset_ttl: DEFAULT_RESET_TTL,
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
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[must_use]
    pub fn reset_ttl(&self) -> Duration {
        self.reset_ttl
    }

    /// Mint an access token for an authenticated identity.
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] when the claims cannot be encoded.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: &str,
        org_unit_id: Option<Uuid>,
        session_id: Uuid,
    ) -> Result<(String, AccessClaims), TokenError> {
        let now = unix_now();
        let claims = AccessClaims {
            sub: user_id,
            email: email.to_string(),
            role: role.to_string(),
            org_unit_id,
            sid: session_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.access_ttl.as_secs(),
            nbf: now,
            iss: ISSUER.to_string(),
            aud: AUDIENCE_ACCESS.to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.access.encoding)
            .map_err(|_| TokenError::Malformed)?;
        Ok((token, claims))
    }

    /// Mint a refresh token bound to a `(user, session)` pair.
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] when the claims cannot be encoded.
    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        token_version: u32,
    ) -> Result<(String, RefreshClaims), TokenError> {
        let now = unix_now();
        let claims = RefreshClaims {
            sub: user_id,
            sid: session_id,
            token_version,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.refresh_ttl.as_secs(),
            nbf: now,
            iss: ISSUER.to_string(),
            aud: AUDIENCE_REFRESH.to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.refresh.encoding)
            .map_err(|_| TokenError::Malformed)?;
        Ok((token, claims))
    }

    /// Mint a password-reset token. Its `jti` is 32 random bytes in hex and
    /// keys the persisted reset record; the token itself never authenticates
    /// a request.
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] when the claims cannot be encoded.
    pub fn issue_reset_token(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<(String, ResetClaims), TokenError> {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let now = unix_now();
        let claims = ResetClaims {
            sub: user_id,
            email: email.to_string(),
            jti: hex::encode(bytes),
            iat: now,
            exp: now + self.reset_ttl.as_secs(),
            nbf: now,
            iss: ISSUER.to_string(),
            aud: AUDIENCE_RESET.to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.reset.encoding)
            .map_err(|_| TokenError::Malformed)?;
        Ok((token, claims))
    }

    /// Verify an access token offline. Revocation is checked separately
    /// against the registry.
    ///
    /// # Errors
    /// Returns the applicable [`TokenError`] kind.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(
            token,
            &self.access.decoding,
            &validation(AUDIENCE_ACCESS),
        )?;
        Ok(data.claims)
    }

    /// # Errors
    /// Returns the applicable [`TokenError`] kind.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data = decode::<RefreshClaims>(
            token,
            &self.refresh.decoding,
            &validation(AUDIENCE_REFRESH),
        )?;
        Ok(data.claims)
    }

    /// # Errors
    /// Returns the applicable [`TokenError`] kind.
    pub fn verify_reset(&self, token: &str) -> Result<ResetClaims, TokenError> {
        let data =
            decode::<ResetClaims>(token, &self.reset.decoding, &validation(AUDIENCE_RESET))?;
        Ok(data.claims)
    }
}

fn validation(audience: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[ISSUER]);
    validation.validate_nbf = true;
    validation.leeway = 0;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            &SecretString::from("access-secret"),
            &SecretString::from("refresh-secret"),
            &SecretString::from("reset-secret"),
        )
    }

    #[test]
    fn access_token_round_trips() -> Result<(), TokenError> {
        let service = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let (token, minted) =
            service.issue_access_token(user, "a@inst.example", "member", None, session)?;
        let claims = service.verify_access(&token)?;
        assert_eq!(claims.sub, user);
        assert_eq!(claims.sid, session);
        assert_eq!(claims.jti, minted.jti);
        assert_eq!(claims.aud, AUDIENCE_ACCESS);
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TTL.as_secs());
        Ok(())
    }

    #[test]
    fn refresh_token_round_trips_with_version() -> Result<(), TokenError> {
        let service = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let (token, _) = service.issue_refresh_token(user, session, 3)?;
        let claims = service.verify_refresh(&token)?;
        assert_eq!(claims.token_version, 3);
        assert_eq!(claims.exp - claims.iat, DEFAULT_REFRESH_TTL.as_secs());
        Ok(())
    }

    #[test]
    fn reset_token_jti_is_64_hex_chars() -> Result<(), TokenError> {
        let service = service();
        let (_, claims) = service.issue_reset_token(Uuid::new_v4(), "a@inst.example")?;
        assert_eq!(claims.jti.len(), 64);
        assert!(claims.jti.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn cross_class_presentation_is_rejected() -> Result<(), TokenError> {
        let service = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let (access, _) =
            service.issue_access_token(user, "a@inst.example", "member", None, session)?;
        let (refresh, _) = service.issue_refresh_token(user, session, 0)?;
        let (reset, _) = service.issue_reset_token(user, "a@inst.example")?;

        assert!(service.verify_refresh(&access).is_err());
        assert!(service.verify_access(&refresh).is_err());
        assert!(service.verify_access(&reset).is_err());
        assert!(service.verify_reset(&access).is_err());
        Ok(())
    }

    #[test]
    fn tampered_signature_is_detected() -> Result<(), TokenError> {
        let service = service();
        let other = TokenService::new(
            &SecretString::from("other-access"),
            &SecretString::from("other-refresh"),
            &SecretString::from("other-reset"),
        );
        let (token, _) = service.issue_access_token(
            Uuid::new_v4(),
            "a@inst.example",
            "member",
            None,
            Uuid::new_v4(),
        )?;
        assert_eq!(
            other.verify_access(&token),
            Err(TokenError::SignatureInvalid)
        );
        Ok(())
    }

    #[test]
    fn expired_token_is_reported_as_expired() -> Result<(), TokenError> {
        let service = service().with_access_ttl(Duration::from_secs(0));
        let (token, _) = service.issue_access_token(
            Uuid::new_v4(),
            "a@inst.example",
            "member",
            None,
            Uuid::new_v4(),
        )?;
        // iat == exp and leeway is zero, so the token is already dead.
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(service.verify_access(&token), Err(TokenError::Expired));
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() {
        let service = service();
        assert_eq!(
            service.verify_access("not-a-token"),
            Err(TokenError::Malformed)
        );
    }
}
