use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

/// Challenge time-to-live. Expiry is evaluated lazily at read time.
pub const CHALLENGE_TTL_SECONDS: i64 = 300;

/// Lifecycle of a challenge. `Pending` is the only non-terminal state; a
/// challenge leaves it exactly once, enforced by conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Completed,
    Used,
}

impl ChallengeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Completed => "completed",
            Self::Used => "used",
        }
    }

    /// Parse the persisted `challenges.status` textual value.
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            "completed" => Ok(Self::Completed),
            "used" => Ok(Self::Used),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid challenges.status value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// What the challenge gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Login,
    PasswordReset,
}

impl ChallengePurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
        }
    }

    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "login" => Ok(Self::Login),
            "password_reset" => Ok(Self::PasswordReset),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid challenges.purpose value: {value}"),
            )))),
        }
    }
}

/// The two supported proof mechanisms, as a tagged variant rather than a
/// pair of optional columns drifting apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofMechanism {
    /// Numeric code displayed to the user and relayed to the device. The
    /// code is not a secret on the initiating side.
    SharedCode { code: String },
    /// Random nonce the device must sign with its registered key.
    SignedChallenge { nonce: Vec<u8> },
}

impl ProofMechanism {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SharedCode { .. } => "shared_code",
            Self::SignedChallenge { .. } => "signed_challenge",
        }
    }
}

/// One authentication or password-reset ceremony.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: Uuid,
    pub account_id: Uuid,
    pub device_id: Option<Uuid>,
    pub purpose: ChallengePurpose,
    pub mechanism: ProofMechanism,
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Challenge {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let purpose: String = row.try_get("purpose")?;
        let mechanism: String = row.try_get("mechanism")?;
        let mechanism = match mechanism.as_str() {
            "shared_code" => ProofMechanism::SharedCode {
                code: row.try_get("verification_code")?,
            },
            "signed_challenge" => ProofMechanism::SignedChallenge {
                nonce: row.try_get("nonce")?,
            },
            other => {
                return Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid challenges.mechanism value: {other}"),
                ))))
            }
        };
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            device_id: row.try_get("device_id")?,
            purpose: ChallengePurpose::from_db(&purpose)?,
            mechanism,
            status: ChallengeStatus::from_db(&status)?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

impl Challenge {
    /// Status as observed at `now`: a pending challenge past its expiry reads
    /// as expired; terminal states are sticky and take precedence over time.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> ChallengeStatus {
        if self.status == ChallengeStatus::Pending && now > self.expires_at {
            ChallengeStatus::Expired
        } else {
            self.status
        }
    }

}
