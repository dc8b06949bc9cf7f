//! Session issuance and lookup.
//!
//! A session is an explicit value: issued when authentication completes,
//! invalidated at logout. The raw token only travels to the client; the
//! store keeps a SHA-256 hash.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Minimal data resolved from a presented session token.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub account_id: Uuid,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Create a new session token.
/// The raw value is only returned to the caller; the store keeps a hash.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the store.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Insert a session for the account and return the raw token.
pub async fn insert(pool: &PgPool, account_id: Uuid, ttl_seconds: i64) -> Result<String> {
    let query = r"
        INSERT INTO sessions (token_hash, account_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(&token_hash)
            .bind(account_id)
            .bind(ttl_seconds)
            .execute(pool)
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some("23505") => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve an unexpired session, recording activity without extending it.
pub async fn lookup(pool: &PgPool, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT accounts.id, accounts.username, sessions.expires_at
        FROM sessions
        JOIN accounts ON accounts.id = sessions.account_id
        WHERE sessions.token_hash = $1
          AND sessions.expires_at > NOW()
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    sqlx::query("UPDATE sessions SET last_seen_at = NOW() WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(Some(SessionRecord {
        account_id: row.get("id"),
        username: row.get("username"),
        expires_at: row.get("expires_at"),
    }))
}

/// Logout is idempotent; deleting an absent session is fine.
pub async fn delete(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await
        .context("failed to delete session")?;
    Ok(())
}
