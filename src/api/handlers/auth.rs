//! Account registration, login and password-reset endpoints.

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::api::handlers::types::{
    CompleteAuthRequest, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    ResetPasswordRequest,
};
use crate::api::handlers::{error_response, missing_payload};
use crate::auth::{audit, AuthService, LoginOutcome, ResetOutcome};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email already taken")
    ),
    tag = "auth"
)]
pub async fn register(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    debug!(username = %request.username, "registration requested");

    let secret = SecretString::from(request.secret);
    let confirm = SecretString::from(request.confirm_secret);
    match auth
        .register(&request.username, &request.email, &secret, &confirm)
        .await
    {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                success: true,
                account: outcome.account,
                session_token: outcome.session_token,
                device_registration_required: outcome.device_registration_required,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established or two-factor required", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let origin = audit::origin_from_headers(&headers);
    let secret = SecretString::from(request.secret);
    match auth.login(&request.username, &secret, &origin).await {
        Ok(LoginOutcome::Success {
            account,
            session_token,
        }) => Json(LoginResponse {
            success: true,
            requires_two_factor: None,
            challenge_id: None,
            verification_code: None,
            expires_at: None,
            account: Some(account),
            session_token: Some(session_token),
        })
        .into_response(),
        Ok(LoginOutcome::RequiresTwoFactor {
            challenge_id,
            verification_code,
            expires_at,
        }) => Json(LoginResponse {
            success: true,
            requires_two_factor: Some(true),
            challenge_id: Some(challenge_id),
            // Shown to the user on this side so they can relay it to the
            // companion device; not a secret in this mechanism.
            verification_code,
            expires_at: Some(expires_at),
            account: None,
            session_token: None,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/complete",
    request_body = CompleteAuthRequest,
    responses(
        (status = 200, description = "Session established", body = LoginResponse),
        (status = 401, description = "Proof mismatch"),
        (status = 409, description = "Challenge not approved or already resolved"),
        (status = 410, description = "Challenge expired")
    ),
    tag = "auth"
)]
pub async fn complete(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<CompleteAuthRequest>>,
) -> impl IntoResponse {
    let request: CompleteAuthRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let origin = audit::origin_from_headers(&headers);
    match auth
        .complete_login(request.challenge_id, &request.proof, &origin)
        .await
    {
        Ok(LoginOutcome::Success {
            account,
            session_token,
        }) => Json(LoginResponse {
            success: true,
            requires_two_factor: None,
            challenge_id: None,
            verification_code: None,
            expires_at: None,
            account: Some(account),
            session_token: Some(session_token),
        })
        .into_response(),
        // complete_login never returns RequiresTwoFactor.
        Ok(LoginOutcome::RequiresTwoFactor { .. }) => {
            error_response(&crate::error::AuthError::Infrastructure(anyhow::anyhow!(
                "unexpected two-factor outcome on completion"
            )))
        }
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unknown account or two-factor approval required")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let new_secret = SecretString::from(request.new_secret);
    let confirm = SecretString::from(request.confirm_secret);
    match auth
        .reset_password(
            &request.username,
            &request.email,
            &new_secret,
            &confirm,
            request.challenge_id,
            request.proof.as_deref(),
        )
        .await
    {
        Ok(ResetOutcome::Done) => Json(json!({ "success": true })).into_response(),
        Ok(ResetOutcome::TwoFactorRequired) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": "two-factor approval required",
                "requires_two_factor": true,
            })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    if let Some(token) = extract_bearer_token(&headers) {
        if let Err(err) = auth.logout(&token).await {
            return error_response(&err);
        }
    }
    StatusCode::NO_CONTENT.into_response()
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
