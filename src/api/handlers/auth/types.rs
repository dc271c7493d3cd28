//! Request/response types for auth endpoints.
//!
//! The wire format is camelCase; internal structs stay snake_case.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::Session;
use crate::users::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub org_unit_id: Option<Uuid>,
    /// Requested role; only self-assignable roles are accepted.
    pub role: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
    pub user: UserProfile,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub org_unit_id: Option<Uuid>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.clone(),
            org_unit_id: user.org_unit_id,
        }
    }
}

/// Body is optional: browser clients carry the refresh token in the
/// cookie instead.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// Destroy every session of the user, not just the current one.
    #[serde(default)]
    pub logout_all: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub org_unit_id: Option<Uuid>,
    pub session_id: Uuid,
    /// Unix seconds of the session's last observed activity.
    pub last_activity: u64,
}

impl From<&Session> for VerifyResponse {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email.clone(),
            role: session.role.clone(),
            org_unit_id: session.org_unit_id,
            session_id: session.session_id,
            last_activity: session.last_activity,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifySecurityQuestionRequest {
    pub reset_token: String,
    pub question_id: Uuid,
    pub answer: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenericResponse {
    pub message: String,
}

impl GenericResponse {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_uses_camel_case() -> Result<()> {
        let decoded: LoginRequest = serde_json::from_str(
            r#"{"email":"a@inst.example","password":"Abc12345!"}"#,
        )?;
        assert_eq!(decoded.email, "a@inst.example");
        Ok(())
    }

    #[test]
    fn token_pair_response_serializes_camel_case() -> Result<()> {
        let response = TokenPairResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 900,
            user: UserProfile {
                id: Uuid::new_v4(),
                email: "a@inst.example".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                role: "member".to_string(),
                org_unit_id: None,
            },
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("accessToken").is_some());
        assert!(value.get("expiresIn").is_some());
        let first_name = value
            .get("user")
            .and_then(|user| user.get("firstName"))
            .and_then(serde_json::Value::as_str)
            .context("missing user.firstName")?;
        assert_eq!(first_name, "Ada");
        Ok(())
    }

    #[test]
    fn logout_request_defaults_to_single_session() -> Result<()> {
        let decoded: LogoutRequest = serde_json::from_str("{}")?;
        assert!(!decoded.logout_all);
        let decoded: LogoutRequest = serde_json::from_str(r#"{"logoutAll":true}"#)?;
        assert!(decoded.logout_all);
        Ok(())
    }

    #[test]
    fn register_request_accepts_optional_org_unit() -> Result<()> {
        let decoded: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@inst.example","password":"Abc12345!","firstName":"Ada","lastName":"Lovelace","orgUnitId":null}"#,
        )?;
        assert!(decoded.org_unit_id.is_none());
        assert!(decoded.role.is_none());
        Ok(())
    }

    #[test]
    fn register_request_carries_requested_role() -> Result<()> {
        let decoded: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@inst.example","password":"Abc12345!","firstName":"Ada","lastName":"Lovelace","role":"member"}"#,
        )?;
        assert_eq!(decoded.role.as_deref(), Some("member"));
        Ok(())
    }
}
