//! Store access for the challenges collection.
//!
//! Every status change goes through [`transition`], a single conditional
//! `UPDATE` keyed on the expected current status. Handlers racing on the
//! same challenge therefore produce exactly one winner; the loser sees zero
//! rows affected.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::challenge::models::{Challenge, ChallengePurpose, ChallengeStatus, ProofMechanism};

const CHALLENGE_COLUMNS: &str = "id, account_id, device_id, purpose, mechanism, \
     verification_code, nonce, status, created_at, expires_at";

/// Insert a pending challenge. The expiry is derived from the store's own
/// clock so `expires_at - created_at` is exact regardless of application
/// clock skew.
pub async fn insert(
    pool: &PgPool,
    id: Uuid,
    account_id: Uuid,
    device_id: Option<Uuid>,
    purpose: ChallengePurpose,
    mechanism: &ProofMechanism,
    ttl_seconds: i64,
) -> Result<Challenge> {
    let (verification_code, nonce): (Option<&str>, Option<&[u8]>) = match mechanism {
        ProofMechanism::SharedCode { code } => (Some(code.as_str()), None),
        ProofMechanism::SignedChallenge { nonce } => (None, Some(nonce.as_slice())),
    };

    sqlx::query_as::<_, Challenge>(&format!(
        r"
        INSERT INTO challenges
            (id, account_id, device_id, purpose, mechanism, verification_code,
             nonce, status, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending',
                NOW() + ($8 * INTERVAL '1 second'))
        RETURNING {CHALLENGE_COLUMNS}
        "
    ))
    .bind(id)
    .bind(account_id)
    .bind(device_id)
    .bind(purpose.as_str())
    .bind(mechanism.kind())
    .bind(verification_code)
    .bind(nonce)
    .bind(ttl_seconds)
    .fetch_one(pool)
    .await
    .context("failed to insert challenge")
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Challenge>> {
    sqlx::query_as::<_, Challenge>(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch challenge")
}

/// The account's most recent pending challenge carrying this shared code.
pub async fn find_pending_by_code(
    pool: &PgPool,
    account_id: Uuid,
    code: &str,
) -> Result<Option<Challenge>> {
    sqlx::query_as::<_, Challenge>(&format!(
        r"
        SELECT {CHALLENGE_COLUMNS}
        FROM challenges
        WHERE account_id = $1
          AND verification_code = $2
          AND status = 'pending'
        ORDER BY created_at DESC
        LIMIT 1
        "
    ))
    .bind(account_id)
    .bind(code)
    .fetch_optional(pool)
    .await
    .context("failed to fetch challenge by code")
}

/// Compare-and-set status transition. Returns false when the challenge was
/// not in `from` anymore, i.e. another handler won the race.
pub async fn transition(
    pool: &PgPool,
    id: Uuid,
    from: ChallengeStatus,
    to: ChallengeStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE challenges SET status = $3 WHERE id = $1 AND status = $2")
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(pool)
        .await
        .context("failed to transition challenge status")?;
    Ok(result.rows_affected() == 1)
}

pub async fn delete_pending_for_account(pool: &PgPool, account_id: Uuid) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM challenges WHERE account_id = $1 AND status = 'pending'")
            .bind(account_id)
            .execute(pool)
            .await
            .context("failed to delete pending challenges")?;
    Ok(result.rows_affected())
}
