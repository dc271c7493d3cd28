//! Registration and password login.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    session::refresh_cookie,
    state::AuthState,
    types::{GenericResponse, LoginRequest, RegisterRequest, TokenPairResponse, UserProfile},
    utils::{extract_client_ip, normalize_email, valid_email},
};
use crate::error::AuthError;
use crate::rate_limit::{RateLimitDecision, RateScope};
use crate::session::Session;
use crate::users::{InsertOutcome, NewUser, password};

/// Role assigned to self-registered accounts; elevation is an admin concern.
const DEFAULT_ROLE: &str = "member";

/// Roles a caller may request at registration. Everything else is
/// granted out of band by an administrator.
const SELF_ASSIGNABLE_ROLES: &[&str] = &[DEFAULT_ROLE];

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Invalid email, password policy violation, or role that is not self-assignable"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many requests")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, AuthError> {
    throttle_ip(&auth_state, &headers).await?;
    throttle_auth_ip(&auth_state, &headers).await?;

    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return Err(AuthError::ValidationFailed("invalid email".to_string()));
    }
    if let Err(violations) = password::validate_password(&payload.password) {
        return Err(AuthError::ValidationFailed(violations.join("; ")));
    }
    let role = payload.role.unwrap_or_else(|| DEFAULT_ROLE.to_string());
    if !SELF_ASSIGNABLE_ROLES.contains(&role.as_str()) {
        return Err(AuthError::ValidationFailed(format!(
            "role \"{role}\" is not self-assignable"
        )));
    }

    let password_hash = password::hash_blocking(payload.password).await?;
    let outcome = auth_state
        .users()
        .insert(NewUser {
            email: email.clone(),
            password_hash,
            first_name: payload.first_name,
            last_name: payload.last_name,
            role,
            org_unit_id: payload.org_unit_id,
        })
        .await?;

    match outcome {
        InsertOutcome::Created(user) => {
            info!(user_id = %user.id, "Account registered");
            Ok((StatusCode::CREATED, Json(UserProfile::from(&user))).into_response())
        }
        InsertOutcome::DuplicateEmail => Ok((
            StatusCode::CONFLICT,
            Json(GenericResponse::new("Email already registered")),
        )
            .into_response()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; token pair issued", body = TokenPairResponse),
        (status = 401, description = "Unknown email or wrong password"),
        (status = 403, description = "Account is inactive"),
        (status = 429, description = "Too many requests"),
        (status = 503, description = "Backing store unavailable")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    throttle_ip(&auth_state, &headers).await?;

    let email = normalize_email(&payload.email);
    // Per-identity budget on top of the IP budget; both must admit.
    if auth_state.limiter().allow(RateScope::Auth, &email).await? == RateLimitDecision::Limited {
        return Err(AuthError::RateLimitExceeded);
    }

    let Some(user) = auth_state.users().find_by_email(&email).await? else {
        // Same error as a wrong password; never confirm account existence.
        return Err(AuthError::InvalidCredentials);
    };
    if !user.is_active {
        return Err(AuthError::AccountInactive);
    }
    if !password::verify_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "Login rejected: wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let session = Session::new(
        user.id,
        &user.email,
        &user.role,
        user.org_unit_id,
        extract_client_ip(&headers),
        user_agent(&headers),
    );
    auth_state.sessions().create(&session).await?;
    let refresh_token = auth_state.rotator().install(&session).await?;
    let (access_token, _) = auth_state.tokens().issue_access_token(
        user.id,
        &user.email,
        &user.role,
        user.org_unit_id,
        session.session_id,
    )?;

    info!(user_id = %user.id, session_id = %session.session_id, "Login succeeded");

    let body = TokenPairResponse {
        access_token,
        refresh_token: refresh_token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: auth_state.tokens().access_ttl().as_secs(),
        user: UserProfile::from(&user),
    };
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = refresh_cookie(auth_state.config(), &refresh_token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

/// Coarse per-IP budget applied before any credential work.
pub(super) async fn throttle_ip(
    auth_state: &AuthState,
    headers: &HeaderMap,
) -> Result<(), AuthError> {
    let ip = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    if auth_state.limiter().allow(RateScope::Ip, &ip).await? == RateLimitDecision::Limited {
        return Err(AuthError::RateLimitExceeded);
    }
    Ok(())
}

/// Stricter credential-endpoint budget, keyed by client IP. Login adds a
/// per-email check on top; register and refresh have no verified identity
/// yet, so the IP is the identity.
pub(super) async fn throttle_auth_ip(
    auth_state: &AuthState,
    headers: &HeaderMap,
) -> Result<(), AuthError> {
    let ip = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    if auth_state.limiter().allow(RateScope::Auth, &ip).await? == RateLimitDecision::Limited {
        return Err(AuthError::RateLimitExceeded);
    }
    Ok(())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
