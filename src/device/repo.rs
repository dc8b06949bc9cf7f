//! Store access for the devices collection.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::device::models::Device;

const DEVICE_COLUMNS: &str = "id, account_id, name, public_key, verified, registration_code, \
     registration_code_expires_at, created_at, last_used_at";

/// Insert a pending device. The registration-code expiry is derived from
/// the store's own clock, the same clock it is later compared against.
pub async fn insert_pending(
    pool: &PgPool,
    account_id: Uuid,
    name: &str,
    public_key: &str,
    registration_code: &str,
    code_ttl_seconds: i64,
) -> Result<Device> {
    sqlx::query_as::<_, Device>(&format!(
        r"
        INSERT INTO devices
            (id, account_id, name, public_key, verified, registration_code,
             registration_code_expires_at)
        VALUES ($1, $2, $3, $4, false, $5, NOW() + ($6 * INTERVAL '1 second'))
        RETURNING {DEVICE_COLUMNS}
        "
    ))
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(name)
    .bind(public_key)
    .bind(registration_code)
    .bind(code_ttl_seconds)
    .fetch_one(pool)
    .await
    .context("failed to insert pending device")
}

/// A pending device whose registration code matches and has not expired.
pub async fn find_pending_by_code(pool: &PgPool, code: &str) -> Result<Option<Device>> {
    sqlx::query_as::<_, Device>(&format!(
        r"
        SELECT {DEVICE_COLUMNS}
        FROM devices
        WHERE registration_code = $1
          AND verified = false
          AND registration_code_expires_at > NOW()
        LIMIT 1
        "
    ))
    .bind(code)
    .fetch_optional(pool)
    .await
    .context("failed to fetch pending device by code")
}

/// Flip a pending device to verified, storing the verification-time name and
/// public key and clearing the registration code. The `registration_code IS
/// NOT NULL` guard makes a second submission a no-op instead of an overwrite.
pub async fn mark_verified(
    pool: &PgPool,
    device_id: Uuid,
    name: &str,
    public_key: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r"
        UPDATE devices
        SET verified = true,
            name = $2,
            public_key = $3,
            registration_code = NULL,
            registration_code_expires_at = NULL,
            last_used_at = NOW()
        WHERE id = $1
          AND verified = false
          AND registration_code IS NOT NULL
        ",
    )
    .bind(device_id)
    .bind(name)
    .bind(public_key)
    .execute(pool)
    .await
    .context("failed to mark device verified")?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_by_id(
    pool: &PgPool,
    account_id: Uuid,
    device_id: Uuid,
) -> Result<Option<Device>> {
    sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1 AND account_id = $2"
    ))
    .bind(device_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch device")
}

pub async fn list_for_account(pool: &PgPool, account_id: Uuid) -> Result<Vec<Device>> {
    sqlx::query_as::<_, Device>(&format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE account_id = $1 ORDER BY created_at"
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("failed to list devices")
}

/// Most-recently-used verified device, the login challenge target.
pub async fn most_recently_used_verified(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Option<Device>> {
    sqlx::query_as::<_, Device>(&format!(
        r"
        SELECT {DEVICE_COLUMNS}
        FROM devices
        WHERE account_id = $1 AND verified = true
        ORDER BY last_used_at DESC NULLS LAST, created_at DESC
        LIMIT 1
        "
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch most recently used device")
}

pub async fn count_verified(pool: &PgPool, account_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE account_id = $1 AND verified = true")
            .bind(account_id)
            .fetch_one(pool)
            .await
            .context("failed to count verified devices")?;
    Ok(count)
}

pub async fn delete(pool: &PgPool, account_id: Uuid, device_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM devices WHERE id = $1 AND account_id = $2")
        .bind(device_id)
        .bind(account_id)
        .execute(pool)
        .await
        .context("failed to delete device")?;
    Ok(result.rows_affected() == 1)
}

pub async fn touch_last_used(pool: &PgPool, device_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE devices SET last_used_at = NOW() WHERE id = $1")
        .bind(device_id)
        .execute(pool)
        .await
        .context("failed to touch device last_used_at")?;
    Ok(())
}

/// Recovery: flip every device of the account back to unverified and clear
/// any outstanding registration codes.
pub async fn reset_all_unverified(pool: &PgPool, account_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        r"
        UPDATE devices
        SET verified = false,
            registration_code = NULL,
            registration_code_expires_at = NULL
        WHERE account_id = $1
        ",
    )
    .bind(account_id)
    .execute(pool)
    .await
    .context("failed to reset devices to unverified")?;
    Ok(result.rows_affected())
}
