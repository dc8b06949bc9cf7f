use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A registered user identity. Root aggregate: devices and challenges refer
/// back to it by id, they are never embedded.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// PHC-format Argon2id string, salt embedded. Never serialized.
    pub password_hash: String,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_password_change_at: Option<DateTime<Utc>>,
}

/// Account projection with secret material stripped. This is the only
/// account shape that crosses the API boundary.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct AccountSafeView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<Account> for AccountSafeView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            two_factor_enabled: account.two_factor_enabled,
            created_at: account.created_at,
            last_login_at: account.last_login_at,
        }
    }
}
