//! Device enrollment and management endpoints.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::handlers::types::{
    BeginDeviceRegistrationRequest, BeginDeviceRegistrationResponse,
    CompleteDeviceRegistrationRequest, CompleteDeviceRegistrationResponse, ListDevicesResponse,
};
use crate::api::handlers::{error_response, missing_payload};
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/devices/register",
    request_body = BeginDeviceRegistrationRequest,
    responses(
        (status = 201, description = "Pending device created", body = BeginDeviceRegistrationResponse),
        (status = 400, description = "Invalid device name or public key"),
        (status = 404, description = "Unknown account")
    ),
    tag = "devices"
)]
pub async fn register_device(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<BeginDeviceRegistrationRequest>>,
) -> impl IntoResponse {
    let request: BeginDeviceRegistrationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    match auth
        .registry()
        .begin_registration(request.account_id, &request.device_name, &request.public_key)
        .await
    {
        Ok(start) => (
            StatusCode::CREATED,
            Json(BeginDeviceRegistrationResponse {
                success: true,
                registration_code: start.registration_code,
                device: start.device,
                backup_codes: start.backup_codes,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/devices/verify",
    request_body = CompleteDeviceRegistrationRequest,
    responses(
        (status = 200, description = "Device verified", body = CompleteDeviceRegistrationResponse),
        (status = 401, description = "Invalid or consumed registration code")
    ),
    tag = "devices"
)]
pub async fn verify_device(
    auth: Extension<Arc<AuthService>>,
    payload: Option<Json<CompleteDeviceRegistrationRequest>>,
) -> impl IntoResponse {
    let request: CompleteDeviceRegistrationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    match auth
        .registry()
        .complete_registration(
            &request.registration_code,
            &request.device_name,
            &request.public_key,
        )
        .await
    {
        Ok(done) => Json(CompleteDeviceRegistrationResponse {
            success: true,
            device_id: done.device_id,
            account: done.account,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/accounts/{account_id}/devices",
    params(
        ("account_id" = Uuid, Path, description = "Account identifier")
    ),
    responses(
        (status = 200, description = "Devices for the account", body = ListDevicesResponse),
        (status = 404, description = "Unknown account")
    ),
    tag = "devices"
)]
pub async fn list_devices(
    auth: Extension<Arc<AuthService>>,
    Path(account_id): Path<Uuid>,
) -> impl IntoResponse {
    match auth.registry().list_devices(account_id).await {
        Ok((devices, two_factor_enabled)) => Json(ListDevicesResponse {
            success: true,
            devices,
            two_factor_enabled,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/accounts/{account_id}/devices/{device_id}",
    params(
        ("account_id" = Uuid, Path, description = "Account identifier"),
        ("device_id" = Uuid, Path, description = "Device identifier")
    ),
    responses(
        (status = 200, description = "Device removed"),
        (status = 404, description = "Unknown account or device"),
        (status = 409, description = "Last verified device of a two-factor account")
    ),
    tag = "devices"
)]
pub async fn remove_device(
    auth: Extension<Arc<AuthService>>,
    Path((account_id, device_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    match auth.remove_device(account_id, device_id).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(&err),
    }
}
