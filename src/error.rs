//! Error taxonomy shared by the challenge engine, device registry and
//! authentication coordinator.
//!
//! Business failures are values, not panics: handlers map each kind onto an
//! HTTP status and a `{success: false, error}` body. Only `Infrastructure`
//! represents a fault of the system itself and is logged as an error.

use axum::http::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum AuthError {
    /// Malformed or missing input, the caller's fault.
    Validation(String),
    /// Account, device or challenge absent.
    NotFound(&'static str),
    /// Duplicate username/email, challenge already resolved, or a
    /// policy refusal such as removing the last verified device.
    Conflict(&'static str),
    /// Challenge past its TTL.
    Expired,
    /// Secret or proof mismatch. The internal reason is kept for the audit
    /// log; user-facing text stays generic to avoid account enumeration.
    Unauthorized(&'static str),
    /// Store unreachable or another systemic fault.
    Infrastructure(anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Expired => StatusCode::GONE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message rendered to the caller. Unauthorized and infrastructure
    /// failures collapse into generic text; the detail only goes to logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Conflict(msg) => (*msg).to_string(),
            Self::Expired => "challenge expired".to_string(),
            Self::Unauthorized(_) => "invalid credentials".to_string(),
            Self::Infrastructure(_) => "internal error".to_string(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Expired => write!(f, "challenge expired"),
            Self::Unauthorized(reason) => write!(f, "unauthorized: {reason}"),
            Self::Infrastructure(err) => write!(f, "infrastructure error: {err}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Infrastructure(err)
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Infrastructure(err.into())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AuthError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::NotFound("account").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::Conflict("username already taken").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AuthError::Expired.status(), StatusCode::GONE);
        assert_eq!(
            AuthError::Unauthorized("wrong secret").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Infrastructure(anyhow::anyhow!("down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_message_is_generic() {
        // Both unknown-user and wrong-secret must render identically.
        let unknown = AuthError::Unauthorized("unknown user");
        let mismatch = AuthError::Unauthorized("secret mismatch");
        assert_eq!(unknown.public_message(), mismatch.public_message());
        assert_eq!(unknown.public_message(), "invalid credentials");
    }

    #[test]
    fn infrastructure_message_hides_detail() {
        let err = AuthError::Infrastructure(anyhow::anyhow!("pool timed out at 10.0.0.1"));
        assert_eq!(err.public_message(), "internal error");
    }
}
