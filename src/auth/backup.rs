//! Single-use backup codes, issued when two-factor is first enabled.
//!
//! Only Argon2id hashes are stored; the plaintext batch is shown once at
//! issuance and cannot be recovered.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::codes;

/// Generate, hash and persist a batch of backup codes, returning the
/// plaintext for one-time display.
pub async fn issue(pool: &PgPool, account_id: Uuid, count: usize) -> Result<Vec<String>> {
    let plaintext = codes::generate_backup_codes(count)?;

    // Replace any earlier batch; stale codes must not stay redeemable.
    sqlx::query("DELETE FROM backup_codes WHERE account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await?;

    for code in &plaintext {
        let hash = hash_code(code)?;
        sqlx::query(
            "INSERT INTO backup_codes (id, account_id, code_hash) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(hash)
        .execute(pool)
        .await?;
    }

    Ok(plaintext)
}

/// Redeem a backup code: marks the matching unused code consumed.
/// Returns false when no unused code matches.
pub async fn redeem(pool: &PgPool, account_id: Uuid, supplied: &str) -> Result<bool> {
    let normalized = codes::normalize_backup_code(supplied);
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT id, code_hash FROM backup_codes WHERE account_id = $1 AND used_at IS NULL",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    for (id, code_hash) in rows {
        if verify_code(&normalized, &code_hash)? {
            // Conditional on used_at so two concurrent redemptions of the
            // same code yield one winner.
            let result = sqlx::query(
                "UPDATE backup_codes SET used_at = NOW() WHERE id = $1 AND used_at IS NULL",
            )
            .bind(id)
            .execute(pool)
            .await?;
            return Ok(result.rows_affected() == 1);
        }
    }

    Ok(false)
}

fn hash_code(code: &str) -> Result<String> {
    let normalized = codes::normalize_backup_code(code);
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash backup code"))?
        .to_string();
    Ok(hash)
}

fn verify_code(normalized: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid backup code hash"))?;
    Ok(Argon2::default()
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_formatting() -> Result<()> {
        let hash = hash_code("a3f9-0b7c-5e21")?;
        assert!(verify_code("a3f90b7c5e21", &hash)?);
        assert!(verify_code(
            &codes::normalize_backup_code("A3F9 0B7C 5E21"),
            &hash
        )?);
        assert!(!verify_code("a3f90b7c5e22", &hash)?);
        Ok(())
    }
}
