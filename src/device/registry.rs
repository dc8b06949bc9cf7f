//! Device registry: the set of authenticator devices bound to an account.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::account::models::AccountSafeView;
use crate::account::repo as accounts;
use crate::auth::backup;
use crate::challenge::proof;
use crate::challenge::repo as challenges;
use crate::codes;
use crate::device::models::{Device, DeviceView};
use crate::device::repo;
use crate::error::{AuthError, AuthResult};

/// Registration codes expire like challenges do.
pub const REGISTRATION_CODE_TTL_SECONDS: i64 = 300;

const BACKUP_CODE_COUNT: usize = 10;

/// Result of starting a device registration. Backup codes are only present
/// when this registration enabled two-factor for the account, and are never
/// shown again.
#[derive(Debug)]
pub struct RegistrationStart {
    pub device: DeviceView,
    pub registration_code: String,
    pub backup_codes: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct RegistrationComplete {
    pub account: AccountSafeView,
    pub device_id: Uuid,
}

#[derive(Clone)]
pub struct DeviceRegistry {
    pool: PgPool,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pending device and hand back its one-time registration code.
    ///
    /// The account's first device also enables two-factor and issues a batch
    /// of single-use backup codes.
    ///
    /// # Errors
    /// `NotFound` for an unknown account, `Validation` for an unusable name
    /// or public key, `Infrastructure` on store failure.
    pub async fn begin_registration(
        &self,
        account_id: Uuid,
        name: &str,
        public_key: &str,
    ) -> AuthResult<RegistrationStart> {
        accounts::find_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("missing device name".to_string()));
        }
        proof::decode_public_key(public_key)?;

        let first_device = repo::list_for_account(&self.pool, account_id)
            .await?
            .is_empty();

        let registration_code = codes::generate_code()?;
        let device = repo::insert_pending(
            &self.pool,
            account_id,
            name,
            public_key,
            &registration_code,
            REGISTRATION_CODE_TTL_SECONDS,
        )
        .await?;

        let backup_codes = if first_device {
            let plaintext = backup::issue(&self.pool, account_id, BACKUP_CODE_COUNT).await?;
            accounts::set_two_factor_enabled(&self.pool, account_id, true).await?;
            info!(account_id = %account_id, "two-factor enabled with first device");
            Some(plaintext)
        } else {
            None
        };

        Ok(RegistrationStart {
            device: DeviceView::from(device),
            registration_code,
            backup_codes,
        })
    }

    /// Complete a registration by matching the pending code.
    ///
    /// The name and public key supplied here are authoritative, replacing
    /// whatever was sent at initiation. A code that was already consumed (or
    /// expired) fails without touching any state; the clear itself is a
    /// conditional write, so double submission cannot corrupt the device.
    ///
    /// # Errors
    /// `Unauthorized` when no pending device matches the code.
    pub async fn complete_registration(
        &self,
        registration_code: &str,
        name: &str,
        public_key: &str,
    ) -> AuthResult<RegistrationComplete> {
        let registration_code = registration_code.trim();
        if registration_code.is_empty() {
            return Err(AuthError::Validation(
                "missing registration code".to_string(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("missing device name".to_string()));
        }
        proof::decode_public_key(public_key)?;

        let device = repo::find_pending_by_code(&self.pool, registration_code)
            .await?
            .ok_or(AuthError::Unauthorized("invalid registration code"))?;

        if !repo::mark_verified(&self.pool, device.id, name, public_key).await? {
            // Lost a race against another submission of the same code.
            return Err(AuthError::Unauthorized("registration code already used"));
        }

        accounts::touch_last_login(&self.pool, device.account_id).await?;
        let account = accounts::find_by_id(&self.pool, device.account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))?;

        info!(account_id = %device.account_id, device_id = %device.id, "device verified");
        Ok(RegistrationComplete {
            account: AccountSafeView::from(account),
            device_id: device.id,
        })
    }

    /// All devices for the account plus its two-factor flag.
    ///
    /// # Errors
    /// `NotFound` for an unknown account.
    pub async fn list_devices(&self, account_id: Uuid) -> AuthResult<(Vec<DeviceView>, bool)> {
        let account = accounts::find_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))?;
        let devices = repo::list_for_account(&self.pool, account_id)
            .await?
            .into_iter()
            .map(DeviceView::from)
            .collect();
        Ok((devices, account.two_factor_enabled))
    }

    /// Mechanical delete. Clears the account's two-factor flag when no
    /// verified device remains; refusing to remove the last device is the
    /// coordinator's policy, not the registry's.
    ///
    /// # Errors
    /// `NotFound` when the device does not exist for the account.
    pub async fn remove_device(&self, account_id: Uuid, device_id: Uuid) -> AuthResult<()> {
        if !repo::delete(&self.pool, account_id, device_id).await? {
            return Err(AuthError::NotFound("device"));
        }
        if repo::count_verified(&self.pool, account_id).await? == 0 {
            accounts::set_two_factor_enabled(&self.pool, account_id, false).await?;
        }
        Ok(())
    }

    /// Lock-out recovery: every device back to unverified, pending
    /// registration codes cleared, live challenges dropped, two-factor off.
    ///
    /// # Errors
    /// `NotFound` for an unknown username.
    pub async fn reset_all_devices_unverified(&self, username: &str) -> AuthResult<u64> {
        let account = accounts::find_by_username(&self.pool, username)
            .await?
            .ok_or(AuthError::NotFound("account"))?;
        let reset = repo::reset_all_unverified(&self.pool, account.id).await?;
        challenges::delete_pending_for_account(&self.pool, account.id).await?;
        accounts::set_two_factor_enabled(&self.pool, account.id, false).await?;
        info!(account_id = %account.id, devices = reset, "devices reset to unverified");
        Ok(reset)
    }

    /// Challenge target selection policy for login: most-recently-used
    /// verified device.
    pub(crate) async fn login_target(&self, account_id: Uuid) -> AuthResult<Option<Device>> {
        Ok(repo::most_recently_used_verified(&self.pool, account_id).await?)
    }
}
