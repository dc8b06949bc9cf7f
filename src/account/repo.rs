//! Store access for the accounts collection.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::account::models::Account;

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, two_factor_enabled, \
     created_at, updated_at, last_login_at, last_password_change_at";

/// Outcome of an account insert. Uniqueness is decided by the store's
/// unique indexes so concurrent signups cannot both succeed.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(Account),
    UsernameTaken,
    EmailTaken,
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch account by id")
}

pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Account>> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("failed to fetch account by username")
}

pub async fn find_by_username_and_email(
    pool: &PgPool,
    username: &str,
    email: &str,
) -> Result<Option<Account>> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1 AND email = $2"
    ))
    .bind(username)
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("failed to fetch account by username and email")
}

pub async fn insert(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<InsertOutcome> {
    let id = Uuid::new_v4();
    let row = sqlx::query_as::<_, Account>(&format!(
        r"
        INSERT INTO accounts (id, username, email, password_hash, two_factor_enabled)
        VALUES ($1, $2, $3, $4, false)
        RETURNING {ACCOUNT_COLUMNS}
        "
    ))
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await;

    match row {
        Ok(account) => Ok(InsertOutcome::Created(account)),
        Err(err) => match unique_violation_constraint(&err) {
            Some(constraint) if constraint.contains("email") => Ok(InsertOutcome::EmailTaken),
            Some(_) => Ok(InsertOutcome::UsernameTaken),
            None => Err(err).context("failed to insert account"),
        },
    }
}

pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE accounts SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to touch last_login_at")?;
    Ok(())
}

pub async fn update_password_hash(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<()> {
    sqlx::query(
        r"
        UPDATE accounts
        SET password_hash = $2,
            last_password_change_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(password_hash)
    .execute(pool)
    .await
    .context("failed to update password hash")?;
    Ok(())
}

pub async fn set_two_factor_enabled(pool: &PgPool, id: Uuid, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE accounts SET two_factor_enabled = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(enabled)
        .execute(pool)
        .await
        .context("failed to update two_factor_enabled")?;
    Ok(())
}

/// Name of the violated unique constraint, when the error is one.
fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => db_err
            .constraint()
            .map(str::to_string)
            .or_else(|| Some(String::new())),
        _ => None,
    }
}
