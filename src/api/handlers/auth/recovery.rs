//! Password recovery endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{
    login::throttle_ip,
    state::AuthState,
    types::{
        ForgotPasswordRequest, GenericResponse, ResetPasswordRequest,
        VerifySecurityQuestionRequest,
    },
    utils::extract_client_ip,
};
use crate::error::AuthError;

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Accepted; a reset email is sent when the account exists", body = GenericResponse),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Backing store unavailable")
    ),
    tag = "recovery"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Response, AuthError> {
    throttle_ip(&auth_state, &headers).await?;

    auth_state
        .recovery()
        .request(&payload.email, extract_client_ip(&headers))
        .await?;

    // Identical body for known and unknown emails.
    Ok((
        StatusCode::OK,
        Json(GenericResponse::new(
            "If the account exists, a reset email has been sent",
        )),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/auth/verify-security-question",
    request_body = VerifySecurityQuestionRequest,
    responses(
        (status = 200, description = "Answer accepted", body = GenericResponse),
        (status = 400, description = "Reset token invalid, expired, or exhausted"),
        (status = 401, description = "Wrong answer"),
        (status = 429, description = "Too many requests")
    ),
    tag = "recovery"
)]
pub async fn verify_security_question(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<VerifySecurityQuestionRequest>,
) -> Result<Response, AuthError> {
    throttle_ip(&auth_state, &headers).await?;

    auth_state
        .recovery()
        .verify_security_question(&payload.reset_token, payload.question_id, &payload.answer)
        .await?;

    Ok((
        StatusCode::OK,
        Json(GenericResponse::new("Security question verified")),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated; all sessions revoked", body = GenericResponse),
        (status = 400, description = "Reset token unusable or password policy violation"),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Backing store unavailable")
    ),
    tag = "recovery"
)]
pub async fn reset_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, AuthError> {
    throttle_ip(&auth_state, &headers).await?;

    auth_state
        .recovery()
        .confirm(&payload.reset_token, &payload.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(GenericResponse::new(
            "Password updated; sign in again on every device",
        )),
    )
        .into_response())
}
