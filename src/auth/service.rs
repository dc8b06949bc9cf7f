//! Authentication coordinator: login, registration and password-reset flows.
//!
//! The coordinator owns flow policy (which device to challenge, when a
//! challenge is required, which removals to refuse); the device registry and
//! challenge engine stay mechanical.

use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::SecretString;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::account::models::AccountSafeView;
use crate::account::repo as accounts;
use crate::auth::{audit, password, session};
use crate::challenge::engine::MechanismKind;
use crate::challenge::models::{ChallengePurpose, ChallengeStatus, ProofMechanism};
use crate::challenge::ChallengeEngine;
use crate::device::DeviceRegistry;
use crate::error::{AuthError, AuthResult};

const MIN_SECRET_LENGTH: usize = 8;

/// Successful registration. `device_registration_required` signals the
/// client to route into device enrollment before full access.
#[derive(Debug)]
pub struct RegisterOutcome {
    pub account: AccountSafeView,
    pub session_token: String,
    pub device_registration_required: bool,
}

/// Outcome of the first login step.
#[derive(Debug)]
pub enum LoginOutcome {
    Success {
        account: AccountSafeView,
        session_token: String,
    },
    /// Two-factor gate: the shared code is displayed to the user on the
    /// initiating side and relayed to the companion device.
    RequiresTwoFactor {
        challenge_id: Uuid,
        verification_code: Option<String>,
        expires_at: DateTime<Utc>,
    },
}

/// Outcome of a password-reset request.
#[derive(Debug)]
pub enum ResetOutcome {
    Done,
    /// The account has two-factor enabled and no approved challenge was
    /// supplied; the caller must run a password-reset ceremony first.
    TwoFactorRequired,
}

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    registry: DeviceRegistry,
    engine: ChallengeEngine,
    session_ttl_seconds: i64,
}

impl AuthService {
    #[must_use]
    pub fn new(pool: PgPool, session_ttl_seconds: i64) -> Self {
        Self {
            registry: DeviceRegistry::new(pool.clone()),
            engine: ChallengeEngine::new(pool.clone()),
            pool,
            session_ttl_seconds,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn engine(&self) -> &ChallengeEngine {
        &self.engine
    }

    /// Create an account. Input validation happens before any store access;
    /// uniqueness is decided by the store's unique indexes.
    ///
    /// # Errors
    /// `Validation` for malformed input or mismatched confirmation,
    /// `Conflict` for a taken username or email.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        secret: &SecretString,
        confirm: &SecretString,
    ) -> AuthResult<RegisterOutcome> {
        use secrecy::ExposeSecret;

        let username = username.trim();
        let email = normalize_email(email);
        if !valid_username(username) {
            return Err(AuthError::Validation("invalid username".to_string()));
        }
        if !valid_email(&email) {
            return Err(AuthError::Validation("invalid email".to_string()));
        }
        validate_secret(secret)?;
        if secret.expose_secret() != confirm.expose_secret() {
            return Err(AuthError::Validation("passwords do not match".to_string()));
        }

        let hash = password::hash_secret(secret)?;
        let account = match accounts::insert(&self.pool, username, &email, &hash).await? {
            accounts::InsertOutcome::Created(account) => account,
            accounts::InsertOutcome::UsernameTaken => {
                return Err(AuthError::Conflict("username already taken"))
            }
            accounts::InsertOutcome::EmailTaken => {
                return Err(AuthError::Conflict("email already taken"))
            }
        };

        let session_token = session::insert(&self.pool, account.id, self.session_ttl_seconds)
            .await?;
        info!(account_id = %account.id, "account registered");

        Ok(RegisterOutcome {
            account: AccountSafeView::from(account),
            session_token,
            device_registration_required: true,
        })
    }

    /// First login step. Unknown users and wrong secrets are internally
    /// distinct (for the audit log) but render identically to the caller.
    ///
    /// # Errors
    /// `Unauthorized` on credential mismatch, `Conflict` when a two-factor
    /// account has no verified device left.
    pub async fn login(
        &self,
        username: &str,
        secret: &SecretString,
        origin: &audit::Origin,
    ) -> AuthResult<LoginOutcome> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("missing username".to_string()));
        }

        let account = match accounts::find_by_username(&self.pool, username).await? {
            Some(account) => account,
            None => {
                audit::record_best_effort(&self.pool, username, false, Some("unknown_user"), origin)
                    .await;
                return Err(AuthError::Unauthorized("unknown user"));
            }
        };

        if !password::verify_secret(secret, &account.password_hash)? {
            audit::record_best_effort(&self.pool, username, false, Some("secret_mismatch"), origin)
                .await;
            return Err(AuthError::Unauthorized("secret mismatch"));
        }

        if !account.two_factor_enabled {
            accounts::touch_last_login(&self.pool, account.id).await?;
            let session_token =
                session::insert(&self.pool, account.id, self.session_ttl_seconds).await?;
            audit::record_best_effort(&self.pool, username, true, None, origin).await;
            info!(account_id = %account.id, "login succeeded");
            return Ok(LoginOutcome::Success {
                account: AccountSafeView::from(account),
                session_token,
            });
        }

        let device = self
            .registry
            .login_target(account.id)
            .await?
            .ok_or(AuthError::Conflict("no verified device"))?;

        let created = self
            .engine
            .create(
                account.id,
                Some(device.id),
                ChallengePurpose::Login,
                MechanismKind::SharedCode,
            )
            .await?;
        audit::record_best_effort(&self.pool, username, false, Some("two_factor_pending"), origin)
            .await;

        Ok(LoginOutcome::RequiresTwoFactor {
            challenge_id: created.challenge_id,
            verification_code: created.verification_code,
            expires_at: created.expires_at,
        })
    }

    /// Second login step, once the companion device has acted.
    ///
    /// Shared-code challenges must already be approved and the supplied
    /// proof must match the displayed code. Signed challenges may be
    /// approved in-line here, the proof being the device's signature.
    ///
    /// # Errors
    /// Engine errors pass through; see [`ChallengeEngine::complete`].
    pub async fn complete_login(
        &self,
        challenge_id: Uuid,
        supplied_proof: &str,
        origin: &audit::Origin,
    ) -> AuthResult<LoginOutcome> {
        let challenge = self.engine.read(challenge_id).await?;
        if challenge.purpose != ChallengePurpose::Login {
            return Err(AuthError::Validation(
                "challenge is not a login challenge".to_string(),
            ));
        }

        match &challenge.mechanism {
            ProofMechanism::SharedCode { code } => {
                if !crate::challenge::proof::code_matches(code, supplied_proof) {
                    return Err(AuthError::Unauthorized("challenge proof mismatch"));
                }
            }
            ProofMechanism::SignedChallenge { .. } => {
                // Push-style completion: verify and approve in one call.
                if challenge.effective_status(Utc::now()) == ChallengeStatus::Pending {
                    let device_id = challenge
                        .device_id
                        .ok_or(AuthError::Validation("challenge has no device".to_string()))?;
                    self.engine
                        .approve(challenge.id, supplied_proof, device_id, challenge.account_id)
                        .await?;
                }
            }
        }

        let account = self.engine.complete(challenge_id).await?;
        let session_token =
            session::insert(&self.pool, account.id, self.session_ttl_seconds).await?;
        audit::record_best_effort(&self.pool, &account.username, true, None, origin).await;
        info!(account_id = %account.id, "two-factor login completed");

        Ok(LoginOutcome::Success {
            account,
            session_token,
        })
    }

    /// Reset the account secret. Confirmation mismatch fails before any
    /// store round-trip; two-factor accounts must consume an approved
    /// password-reset challenge.
    ///
    /// # Errors
    /// `Validation` for mismatched/weak secrets, `Unauthorized` for an
    /// unknown username/email pair, engine errors for the challenge.
    pub async fn reset_password(
        &self,
        username: &str,
        email: &str,
        new_secret: &SecretString,
        confirm: &SecretString,
        challenge_id: Option<Uuid>,
        supplied_proof: Option<&str>,
    ) -> AuthResult<ResetOutcome> {
        use secrecy::ExposeSecret;

        if new_secret.expose_secret() != confirm.expose_secret() {
            return Err(AuthError::Validation("passwords do not match".to_string()));
        }
        validate_secret(new_secret)?;

        let email = normalize_email(email);
        let account = accounts::find_by_username_and_email(&self.pool, username.trim(), &email)
            .await?
            .ok_or(AuthError::Unauthorized("unknown account"))?;

        if account.two_factor_enabled {
            let Some(challenge_id) = challenge_id else {
                return Ok(ResetOutcome::TwoFactorRequired);
            };
            self.engine
                .consume_for_password_reset(challenge_id, account.id, supplied_proof)
                .await?;
        }

        let hash = password::hash_secret(new_secret)?;
        accounts::update_password_hash(&self.pool, account.id, &hash).await?;
        info!(account_id = %account.id, "password reset");

        Ok(ResetOutcome::Done)
    }

    /// User-facing device removal. Refuses to strand a two-factor account
    /// without its last verified device; recovery goes through
    /// [`DeviceRegistry::reset_all_devices_unverified`] instead.
    ///
    /// # Errors
    /// `Conflict` for the last verified device of a two-factor account,
    /// `NotFound` otherwise as in the registry.
    pub async fn remove_device(&self, account_id: Uuid, device_id: Uuid) -> AuthResult<()> {
        let account = accounts::find_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))?;
        if account.two_factor_enabled {
            let device = crate::device::repo::find_by_id(&self.pool, account_id, device_id)
                .await?
                .ok_or(AuthError::NotFound("device"))?;
            let verified = crate::device::repo::count_verified(&self.pool, account_id).await?;
            if device.verified && verified <= 1 {
                return Err(AuthError::Conflict("cannot remove last device"));
            }
        }
        self.registry.remove_device(account_id, device_id).await
    }

    /// Invalidate a presented session token. Idempotent.
    pub async fn logout(&self, token: &str) -> AuthResult<()> {
        let token_hash = session::hash_session_token(token);
        session::delete(&self.pool, &token_hash).await?;
        Ok(())
    }
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames: 3-32 characters, letters/digits/`._-`.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9._-]{3,32}$").is_ok_and(|regex| regex.is_match(username))
}

fn validate_secret(secret: &SecretString) -> AuthResult<()> {
    use secrecy::ExposeSecret;
    if secret.expose_secret().len() < MIN_SECRET_LENGTH {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_SECRET_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> Result<AuthService> {
        // Lazy pool: never connects unless a query runs, which these tests
        // must not trigger.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        Ok(AuthService::new(pool, 3600))
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_and_rejects() {
        assert!(valid_email("alice@x.com"));
        assert!(valid_email("name.surname@example.co"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_username_bounds() {
        assert!(valid_username("alice"));
        assert!(valid_username("a.l-i_ce42"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"x".repeat(33)));
    }

    #[tokio::test]
    async fn reset_password_mismatch_fails_before_store() -> Result<()> {
        // A lazy pool with no reachable database: the mismatch must be
        // rejected before any round-trip is attempted.
        let service = service()?;
        let result = service
            .reset_password(
                "alice",
                "alice@x.com",
                &secret("NewStr0ng!Pass"),
                &secret("OtherStr0ng!Pass"),
                None,
                None,
            )
            .await;
        match result {
            Err(AuthError::Validation(msg)) => assert!(msg.contains("match")),
            other => panic!("expected validation error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn register_mismatch_fails_before_store() -> Result<()> {
        let service = service()?;
        let result = service
            .register(
                "alice",
                "alice@x.com",
                &secret("Str0ng!Pass"),
                &secret("Str0ng!Pass2"),
            )
            .await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_bad_input_before_store() -> Result<()> {
        let service = service()?;
        let cases = [
            ("ab", "alice@x.com", "Str0ng!Pass"),
            ("alice", "not-an-email", "Str0ng!Pass"),
            ("alice", "alice@x.com", "short"),
        ];
        for (username, email, pass) in cases {
            let result = service
                .register(username, email, &secret(pass), &secret(pass))
                .await;
            assert!(
                matches!(result, Err(AuthError::Validation(_))),
                "case {username}/{email} should fail validation"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_empty_username_before_store() -> Result<()> {
        let service = service()?;
        let result = service
            .login("  ", &secret("whatever1"), &audit::Origin::default())
            .await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
        Ok(())
    }
}
