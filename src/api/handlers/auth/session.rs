//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::debug;

use super::{
    state::{AuthConfig, AuthState},
    types::{GenericResponse, LogoutRequest, VerifyResponse},
};
use crate::error::AuthError;
use crate::session::Session;
use crate::token::AccessClaims;

pub(super) const REFRESH_COOKIE_NAME: &str = "ingresso_refresh";

#[utoipa::path(
    get,
    path = "/auth/verify",
    responses(
        (status = 200, description = "Access token is valid", body = VerifyResponse),
        (status = 401, description = "Token missing, malformed, expired, or revoked")
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let (_, session) = authenticate(&headers, &auth_state).await?;
    Ok(Json(VerifyResponse::from(&session)))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session destroyed and cookie cleared", body = GenericResponse),
        (status = 401, description = "Token missing, malformed, expired, or revoked")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let (claims, session) = authenticate(&headers, &auth_state).await?;
    let logout_all = payload.is_some_and(|Json(body)| body.logout_all);

    if logout_all {
        let purged = auth_state
            .sessions()
            .purge_user(auth_state.revocation(), claims.sub)
            .await?;
        debug!(user_id = %claims.sub, sessions = purged, "Logout-all completed");
    } else {
        // Revoke before deleting state so in-flight requests carrying this
        // session's tokens fail closed rather than racing the deletion.
        auth_state
            .revocation()
            .revoke(
                &session.session_id.to_string(),
                crate::kv::unix_now() + auth_state.config().refresh_ttl().as_secs(),
            )
            .await?;
        auth_state.sessions().delete(session.session_id).await?;
        auth_state
            .store()
            .delete(&crate::session::refresh_key(claims.sub, session.session_id))
            .await?;
    }

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    Ok((
        StatusCode::OK,
        response_headers,
        Json(GenericResponse::new("Logged out")),
    ))
}

/// Resolve the bearer access token into verified claims and a live session.
///
/// Verification order: signature and expiry first, then the revocation
/// registry keyed by session id, then the session record itself. A valid
/// token whose session is gone counts as revoked. Side effect: the
/// session's sliding TTL is extended.
pub(super) async fn authenticate(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<(AccessClaims, Session), AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::TokenMalformed)?;
    let claims = auth_state.tokens().verify_access(&token)?;

    if auth_state
        .revocation()
        .is_revoked(&claims.sid.to_string())
        .await?
    {
        return Err(AuthError::TokenRevoked);
    }

    let Some(session) = auth_state.sessions().get(claims.sid).await? else {
        return Err(AuthError::TokenRevoked);
    };

    auth_state.sessions().touch(claims.sid).await?;
    Ok((claims, session))
}

/// Build the `HttpOnly` refresh cookie set on login and rotation.
pub(super) fn refresh_cookie(
    auth_config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = auth_config.refresh_ttl().as_secs();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if auth_config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(
    auth_config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if auth_config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Refresh token from the cookie, for browser clients that omit the body.
pub(super) fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(frontend: &str) -> AuthConfig {
        AuthConfig::new(
            frontend.to_string(),
            SecretString::from("a"),
            SecretString::from("r"),
            SecretString::from("p"),
        )
    }

    #[test]
    fn extract_bearer_token_variants() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  abc "));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn refresh_cookie_is_http_only_and_scoped() {
        let cookie = refresh_cookie(&config("https://portal.inst.example"), "tok")
            .expect("header value");
        let value = cookie.to_str().expect("ascii");
        assert!(value.starts_with("ingresso_refresh=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Secure"));
    }

    #[test]
    fn refresh_cookie_omits_secure_on_plain_http() {
        let cookie =
            refresh_cookie(&config("http://localhost:3000"), "tok").expect("header value");
        assert!(!cookie.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie(&config("http://localhost:3000")).expect("header value");
        assert!(cookie.to_str().expect("ascii").contains("Max-Age=0"));
    }

    #[test]
    fn extract_refresh_cookie_finds_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; ingresso_refresh=tok123; lang=en"),
        );
        assert_eq!(
            extract_refresh_cookie(&headers),
            Some("tok123".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark"),
        );
        assert_eq!(extract_refresh_cookie(&headers), None);
    }

    #[tokio::test]
    async fn authenticate_rejects_after_logout_all() {
        use crate::kv::MemoryStore;
        use crate::recovery::{LogResetNotifier, ResetNotifier};
        use crate::users::{CredentialStore, MemoryCredentialStore};
        use uuid::Uuid;

        let state = AuthState::new(
            config("https://portal.inst.example"),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>,
            Arc::new(LogResetNotifier) as Arc<dyn ResetNotifier>,
        );

        let user_id = Uuid::new_v4();
        let session = Session::new(user_id, "ada@inst.example", "member", None, None, None);
        state.sessions().create(&session).await.expect("create");
        let (access, _) = state
            .tokens()
            .issue_access_token(
                user_id,
                "ada@inst.example",
                "member",
                None,
                session.session_id,
            )
            .expect("token");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access}")).expect("header"),
        );
        let (claims, found) = authenticate(&headers, &state).await.expect("authenticated");
        assert_eq!(claims.sid, session.session_id);
        assert_eq!(found.session_id, session.session_id);

        state
            .sessions()
            .purge_user(state.revocation(), user_id)
            .await
            .expect("purge");

        let denied = authenticate(&headers, &state).await;
        assert!(matches!(denied, Err(AuthError::TokenRevoked)));
    }
}
