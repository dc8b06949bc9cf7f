//! Challenge lifecycle endpoints: create, approve from the companion
//! device, and poll status.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::handlers::types::{
    ApproveChallengeRequest, ChallengeStatusResponse, CreateChallengeRequest,
    CreateChallengeResponse,
};
use crate::api::handlers::{error_response, missing_payload};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/challenges",
    request_body = CreateChallengeRequest,
    responses(
        (status = 201, description = "Challenge created", body = CreateChallengeResponse),
        (status = 404, description = "Unknown account or device")
    ),
    tag = "challenges"
)]
pub async fn create_challenge(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<CreateChallengeRequest>>,
) -> impl IntoResponse {
    let request: CreateChallengeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let kind = request.mechanism.unwrap_or_default();
    match auth
        .engine()
        .create(request.account_id, request.device_id, request.purpose, kind)
        .await
    {
        Ok(created) => (
            StatusCode::CREATED,
            Json(CreateChallengeResponse {
                success: true,
                challenge_id: created.challenge_id,
                verification_code: created.verification_code,
                nonce: created.nonce,
                expires_at: created.expires_at,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    put,
    path = "/v1/challenges/{challenge_id}",
    params(
        ("challenge_id" = Uuid, Path, description = "Challenge identifier")
    ),
    request_body = ApproveChallengeRequest,
    responses(
        (status = 200, description = "Challenge approved"),
        (status = 401, description = "Binding or proof mismatch"),
        (status = 409, description = "Challenge already resolved"),
        (status = 410, description = "Challenge expired")
    ),
    tag = "challenges"
)]
pub async fn approve_challenge(
    auth: Extension<Arc<AuthService>>,
    Path(challenge_id): Path<Uuid>,
    payload: Option<Json<ApproveChallengeRequest>>,
) -> impl IntoResponse {
    let request: ApproveChallengeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    match auth
        .engine()
        .approve(
            challenge_id,
            &request.proof,
            request.device_id,
            request.account_id,
        )
        .await
    {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/challenges/{challenge_id}",
    params(
        ("challenge_id" = Uuid, Path, description = "Challenge identifier")
    ),
    responses(
        (status = 200, description = "Current status", body = ChallengeStatusResponse),
        (status = 404, description = "Unknown challenge")
    ),
    tag = "challenges"
)]
pub async fn challenge_status(
    auth: Extension<Arc<AuthService>>,
    Path(challenge_id): Path<Uuid>,
) -> impl IntoResponse {
    match auth.engine().read(challenge_id).await {
        Ok(challenge) => Json(ChallengeStatusResponse {
            success: true,
            status: challenge.effective_status(Utc::now()),
            expires_at: challenge.expires_at,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn auth_service() -> Result<Arc<AuthService>> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(Arc::new(AuthService::new(pool, 3600)))
    }

    #[tokio::test]
    async fn create_challenge_missing_payload() -> Result<()> {
        let response = create_challenge(Extension(auth_service()?), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn approve_challenge_missing_payload() -> Result<()> {
        let response = approve_challenge(Extension(auth_service()?), Path(Uuid::nil()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
