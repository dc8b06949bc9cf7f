//! Generated OpenAPI document for the HTTP surface.

use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::account::models::AccountSafeView;
use crate::api::handlers;
use crate::api::handlers::types::{
    ApproveChallengeRequest, BeginDeviceRegistrationRequest, BeginDeviceRegistrationResponse,
    ChallengeStatusResponse, CompleteAuthRequest, CompleteDeviceRegistrationRequest,
    CompleteDeviceRegistrationResponse, CreateChallengeRequest, CreateChallengeResponse,
    ListDevicesResponse, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    ResetPasswordRequest,
};
use crate::challenge::engine::MechanismKind;
use crate::challenge::models::{ChallengePurpose, ChallengeStatus};
use crate::device::models::DeviceView;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::complete,
        handlers::auth::reset_password,
        handlers::auth::logout,
        handlers::devices::register_device,
        handlers::devices::verify_device,
        handlers::devices::list_devices,
        handlers::devices::remove_device,
        handlers::challenges::create_challenge,
        handlers::challenges::approve_challenge,
        handlers::challenges::challenge_status,
    ),
    components(schemas(
        AccountSafeView,
        DeviceView,
        ChallengePurpose,
        ChallengeStatus,
        MechanismKind,
        RegisterRequest,
        RegisterResponse,
        LoginRequest,
        LoginResponse,
        CompleteAuthRequest,
        ResetPasswordRequest,
        BeginDeviceRegistrationRequest,
        BeginDeviceRegistrationResponse,
        CompleteDeviceRegistrationRequest,
        CompleteDeviceRegistrationResponse,
        ListDevicesResponse,
        CreateChallengeRequest,
        CreateChallengeResponse,
        ApproveChallengeRequest,
        ChallengeStatusResponse,
    )),
    tags(
        (name = "auth", description = "Account registration, login and password reset"),
        (name = "devices", description = "Authenticator device enrollment and management"),
        (name = "challenges", description = "Two-factor challenge lifecycle"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
