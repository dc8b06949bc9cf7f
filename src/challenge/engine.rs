//! Challenge engine: creation, resolution and expiry of authentication
//! ceremonies.
//!
//! The engine is stateless between calls; the store holds every challenge
//! and all transitions are conditional writes (see [`crate::challenge::repo`]).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::account::models::AccountSafeView;
use crate::account::repo as accounts;
use crate::challenge::models::{
    Challenge, ChallengePurpose, ChallengeStatus, ProofMechanism, CHALLENGE_TTL_SECONDS,
};
use crate::challenge::{proof, repo};
use crate::codes;
use crate::device::repo as devices;
use crate::error::{AuthError, AuthResult};

/// Requested proof mechanism for a new challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MechanismKind {
    SharedCode,
    SignedChallenge,
}

impl Default for MechanismKind {
    fn default() -> Self {
        Self::SharedCode
    }
}

/// A freshly created challenge. Exactly one of `verification_code` and
/// `nonce` is set, depending on the mechanism.
#[derive(Debug)]
pub struct CreatedChallenge {
    pub challenge_id: Uuid,
    pub verification_code: Option<String>,
    /// Base64 nonce for the device to sign.
    pub nonce: Option<String>,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct ChallengeEngine {
    pool: PgPool,
}

impl ChallengeEngine {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pending challenge bound to the account (and optionally a
    /// specific device). No side effect on the account itself.
    ///
    /// # Errors
    /// `NotFound` for an unknown account or device.
    pub async fn create(
        &self,
        account_id: Uuid,
        device_id: Option<Uuid>,
        purpose: ChallengePurpose,
        kind: MechanismKind,
    ) -> AuthResult<CreatedChallenge> {
        accounts::find_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))?;
        if let Some(device_id) = device_id {
            devices::find_by_id(&self.pool, account_id, device_id)
                .await?
                .ok_or(AuthError::NotFound("device"))?;
        }

        let mechanism = match kind {
            MechanismKind::SharedCode => ProofMechanism::SharedCode {
                code: codes::generate_code()?,
            },
            MechanismKind::SignedChallenge => ProofMechanism::SignedChallenge {
                nonce: codes::generate_nonce()?.to_vec(),
            },
        };

        let id = codes::generate_challenge_id();
        let challenge = repo::insert(
            &self.pool,
            id,
            account_id,
            device_id,
            purpose,
            &mechanism,
            CHALLENGE_TTL_SECONDS,
        )
        .await?;

        info!(
            challenge_id = %challenge.id,
            account_id = %account_id,
            purpose = purpose.as_str(),
            mechanism = mechanism.kind(),
            "challenge created"
        );

        let (verification_code, nonce) = match mechanism {
            ProofMechanism::SharedCode { code } => (Some(code), None),
            ProofMechanism::SignedChallenge { nonce } => (
                None,
                Some({
                    use base64::Engine;
                    base64::engine::general_purpose::STANDARD.encode(nonce)
                }),
            ),
        };

        Ok(CreatedChallenge {
            challenge_id: challenge.id,
            verification_code,
            nonce,
            expires_at: challenge.expires_at,
        })
    }

    /// Read a challenge, persisting the lazy pending-to-expired transition
    /// when its TTL has passed.
    ///
    /// # Errors
    /// `NotFound` when the id does not resolve.
    pub async fn read(&self, challenge_id: Uuid) -> AuthResult<Challenge> {
        let mut challenge = repo::find_by_id(&self.pool, challenge_id)
            .await?
            .ok_or(AuthError::NotFound("challenge"))?;

        if !challenge.status.is_terminal()
            && challenge.effective_status(Utc::now()) == ChallengeStatus::Expired
        {
            // Best effort: if a racing transition won, the stored status is
            // terminal anyway and a re-read reflects it.
            if repo::transition(
                &self.pool,
                challenge.id,
                ChallengeStatus::Pending,
                ChallengeStatus::Expired,
            )
            .await?
            {
                challenge.status = ChallengeStatus::Expired;
            } else {
                challenge = repo::find_by_id(&self.pool, challenge_id)
                    .await?
                    .ok_or(AuthError::NotFound("challenge"))?;
            }
        }

        Ok(challenge)
    }

    /// Polling entry point for a client that displayed a shared code and
    /// waits for the companion device to act on it.
    ///
    /// # Errors
    /// `NotFound` when no live challenge carries the code.
    pub async fn resolve_by_code(&self, account_id: Uuid, code: &str) -> AuthResult<Challenge> {
        let challenge = repo::find_pending_by_code(&self.pool, account_id, code)
            .await?
            .ok_or(AuthError::NotFound("challenge"))?;
        self.read(challenge.id).await
    }

    /// Companion-device approval. Verifies existence, liveness, binding and
    /// proof, then transitions the challenge exactly once.
    ///
    /// # Errors
    /// `Expired` past TTL (persisted), `Conflict` when already resolved,
    /// `Unauthorized` on binding or proof mismatch.
    pub async fn approve(
        &self,
        challenge_id: Uuid,
        supplied_proof: &str,
        device_id: Uuid,
        account_id: Uuid,
    ) -> AuthResult<()> {
        let challenge = self.read(challenge_id).await?;

        match challenge.effective_status(Utc::now()) {
            ChallengeStatus::Pending => {}
            ChallengeStatus::Expired => return Err(AuthError::Expired),
            _ => return Err(AuthError::Conflict("challenge already resolved")),
        }

        if challenge.account_id != account_id {
            return Err(AuthError::Unauthorized("challenge account mismatch"));
        }
        if let Some(bound) = challenge.device_id {
            if bound != device_id {
                return Err(AuthError::Unauthorized("challenge device mismatch"));
            }
        }
        let device = devices::find_by_id(&self.pool, account_id, device_id)
            .await?
            .ok_or(AuthError::NotFound("device"))?;

        let proof_ok = match &challenge.mechanism {
            ProofMechanism::SharedCode { code } => proof::code_matches(code, supplied_proof),
            ProofMechanism::SignedChallenge { nonce } => {
                let key = proof::decode_public_key(&device.public_key)?;
                proof::signature_matches(&key, nonce, supplied_proof)
            }
        };

        if !proof_ok {
            // The failed attempt still consumes the challenge.
            let _ = repo::transition(
                &self.pool,
                challenge.id,
                ChallengeStatus::Pending,
                ChallengeStatus::Rejected,
            )
            .await?;
            return Err(AuthError::Unauthorized("challenge proof mismatch"));
        }

        if !repo::transition(
            &self.pool,
            challenge.id,
            ChallengeStatus::Pending,
            ChallengeStatus::Approved,
        )
        .await?
        {
            return Err(AuthError::Conflict("challenge already resolved"));
        }

        if matches!(challenge.mechanism, ProofMechanism::SignedChallenge { .. }) {
            devices::touch_last_used(&self.pool, device.id).await?;
        }

        info!(challenge_id = %challenge.id, device_id = %device.id, "challenge approved");
        Ok(())
    }

    /// Final step of a login ceremony: the initiating client observed the
    /// approval and asks for the session-establishing account view.
    ///
    /// # Errors
    /// `Expired`, `Conflict` when not approved or when another completion
    /// won, `NotFound` for unknown ids.
    pub async fn complete(&self, challenge_id: Uuid) -> AuthResult<AccountSafeView> {
        let challenge = self.read(challenge_id).await?;

        match challenge.effective_status(Utc::now()) {
            ChallengeStatus::Approved => {}
            ChallengeStatus::Expired => return Err(AuthError::Expired),
            ChallengeStatus::Pending => {
                return Err(AuthError::Conflict("challenge not approved yet"))
            }
            _ => return Err(AuthError::Conflict("challenge already resolved")),
        }

        if !repo::transition(
            &self.pool,
            challenge.id,
            ChallengeStatus::Approved,
            ChallengeStatus::Completed,
        )
        .await?
        {
            return Err(AuthError::Conflict("challenge already resolved"));
        }

        accounts::touch_last_login(&self.pool, challenge.account_id).await?;
        let account = accounts::find_by_id(&self.pool, challenge.account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))?;

        info!(challenge_id = %challenge.id, account_id = %account.id, "challenge completed");
        Ok(AccountSafeView::from(account))
    }

    /// Consume an approved password-reset challenge. With the shared-code
    /// mechanism a pending challenge plus the matching code is also
    /// acceptable (the reset form itself carries the code).
    ///
    /// # Errors
    /// `Validation` for a login-purpose challenge, `Unauthorized` for a
    /// proof/account mismatch, `Expired`/`Conflict` as in approval.
    pub async fn consume_for_password_reset(
        &self,
        challenge_id: Uuid,
        account_id: Uuid,
        supplied_proof: Option<&str>,
    ) -> AuthResult<()> {
        let challenge = self.read(challenge_id).await?;

        if challenge.purpose != ChallengePurpose::PasswordReset {
            return Err(AuthError::Validation(
                "challenge is not a password-reset challenge".to_string(),
            ));
        }
        if challenge.account_id != account_id {
            return Err(AuthError::Unauthorized("challenge account mismatch"));
        }

        let from = match challenge.effective_status(Utc::now()) {
            ChallengeStatus::Approved => ChallengeStatus::Approved,
            ChallengeStatus::Pending => match (&challenge.mechanism, supplied_proof) {
                (ProofMechanism::SharedCode { code }, Some(proof))
                    if proof::code_matches(code, proof) =>
                {
                    ChallengeStatus::Pending
                }
                _ => return Err(AuthError::Unauthorized("challenge not approved")),
            },
            ChallengeStatus::Expired => return Err(AuthError::Expired),
            _ => return Err(AuthError::Conflict("challenge already resolved")),
        };

        if !repo::transition(&self.pool, challenge.id, from, ChallengeStatus::Used).await? {
            return Err(AuthError::Conflict("challenge already resolved"));
        }

        info!(challenge_id = %challenge.id, "password-reset challenge consumed");
        Ok(())
    }
}
