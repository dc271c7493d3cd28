//! Refresh-token exchange.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{
    login::{throttle_auth_ip, throttle_ip},
    session::{extract_refresh_cookie, refresh_cookie},
    state::AuthState,
    types::{RefreshRequest, RefreshResponse},
};
use crate::error::AuthError;

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = RefreshResponse),
        (status = 401, description = "Token invalid, expired, revoked, or reused"),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Backing store unavailable")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Response, AuthError> {
    throttle_ip(&auth_state, &headers).await?;
    throttle_auth_ip(&auth_state, &headers).await?;

    // Body wins over cookie so API clients can drive rotation explicitly.
    let presented = payload
        .and_then(|Json(body)| body.refresh_token)
        .or_else(|| extract_refresh_cookie(&headers))
        .ok_or(AuthError::TokenMalformed)?;

    let rotated = auth_state.rotator().rotate(&presented).await?;

    let body = RefreshResponse {
        access_token: rotated.access_token,
        refresh_token: rotated.refresh_token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: rotated.expires_in,
    };
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = refresh_cookie(auth_state.config(), &rotated.refresh_token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}
