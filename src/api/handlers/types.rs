//! Request/response types for the authentication, device and challenge
//! endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::account::models::AccountSafeView;
use crate::challenge::engine::MechanismKind;
use crate::challenge::models::{ChallengePurpose, ChallengeStatus};
use crate::device::models::DeviceView;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub secret: String,
    pub confirm_secret: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub success: bool,
    pub account: AccountSafeView,
    pub session_token: String,
    /// The client should route into device enrollment before full access.
    pub device_registration_required: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub secret: String,
}

/// Login result. With two-factor pending, `challenge_id` and the displayed
/// `verification_code` are set instead of the session fields.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_two_factor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountSafeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteAuthRequest {
    pub challenge_id: Uuid,
    pub proof: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub email: String,
    pub new_secret: String,
    pub confirm_secret: String,
    #[serde(default)]
    pub challenge_id: Option<Uuid>,
    #[serde(default)]
    pub proof: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BeginDeviceRegistrationRequest {
    pub account_id: Uuid,
    pub device_name: String,
    /// Base64 Ed25519 public key.
    pub public_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BeginDeviceRegistrationResponse {
    pub success: bool,
    pub registration_code: String,
    pub device: DeviceView,
    /// Present only when this registration enabled two-factor; shown once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_codes: Option<Vec<String>>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteDeviceRegistrationRequest {
    pub registration_code: String,
    pub device_name: String,
    pub public_key: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteDeviceRegistrationResponse {
    pub success: bool,
    pub device_id: Uuid,
    pub account: AccountSafeView,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ListDevicesResponse {
    pub success: bool,
    pub devices: Vec<DeviceView>,
    pub two_factor_enabled: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateChallengeRequest {
    pub account_id: Uuid,
    #[serde(default)]
    pub device_id: Option<Uuid>,
    pub purpose: ChallengePurpose,
    #[serde(default)]
    pub mechanism: Option<MechanismKind>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateChallengeResponse {
    pub success: bool,
    pub challenge_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    /// Base64 nonce for the signed-challenge mechanism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApproveChallengeRequest {
    pub proof: String,
    pub device_id: Uuid,
    pub account_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeStatusResponse {
    pub success: bool,
    pub status: ChallengeStatus,
    pub expires_at: DateTime<Utc>,
}
