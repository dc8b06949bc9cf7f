use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A secondary authenticator bound to an account.
///
/// Created in pending state (registration code set, `verified` false) and
/// flipped to verified when the companion device answers with the matching
/// code. The registration code is cleared on success and never reissued.
#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    /// Base64-encoded Ed25519 public key, opaque to the registry.
    pub public_key: String,
    pub verified: bool,
    pub registration_code: Option<String>,
    pub registration_code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Device projection for API responses; the registration code stays
/// server-side.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct DeviceView {
    pub id: Uuid,
    pub name: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Device> for DeviceView {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            name: device.name,
            verified: device.verified,
            created_at: device.created_at,
            last_used_at: device.last_used_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn view_hides_registration_code() -> Result<()> {
        let device = Device {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            name: "pixel".to_string(),
            public_key: "AAAA".to_string(),
            verified: false,
            registration_code: Some("123456".to_string()),
            registration_code_expires_at: Some(Utc::now()),
            created_at: Utc::now(),
            last_used_at: None,
        };
        let value = serde_json::to_value(DeviceView::from(device))?;
        assert!(value.get("registration_code").is_none());
        assert!(!value.to_string().contains("123456"));
        Ok(())
    }
}
