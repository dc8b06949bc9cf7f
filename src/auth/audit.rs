//! Append-only login-attempt log. Written once, never mutated or deleted by
//! this service.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// Request origin metadata captured for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub async fn record(
    pool: &PgPool,
    username: &str,
    success: bool,
    error_kind: Option<&str>,
    origin: &Origin,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO login_attempts (id, username, success, error_kind, ip, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(success)
    .bind(error_kind)
    .bind(origin.ip.as_deref())
    .bind(origin.user_agent.as_deref())
    .execute(pool)
    .await
    .context("failed to record login attempt")?;
    Ok(())
}

/// Audit writes must never fail the login itself.
pub async fn record_best_effort(
    pool: &PgPool,
    username: &str,
    success: bool,
    error_kind: Option<&str>,
    origin: &Origin,
) {
    if let Err(err) = record(pool, username, success, error_kind, origin).await {
        warn!("failed to write login attempt: {err}");
    }
}

/// Extract origin metadata from common proxy headers.
#[must_use]
pub fn origin_from_headers(headers: &axum::http::HeaderMap) -> Origin {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        });
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Origin { ip, user_agent }
}
