//! End-to-end flows against a live Postgres instance.
//!
//! These tests require `KEYWARD_TEST_DSN` to point at a disposable database;
//! without it every test is a no-op skip so the suite stays green in
//! environments with no store available.

use anyhow::{Context, Result};
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use secrecy::SecretString;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use keyward::auth::{audit::Origin, session, AuthService, LoginOutcome, ResetOutcome};
use keyward::challenge::models::{ChallengePurpose, ChallengeStatus, ProofMechanism};
use keyward::challenge::{engine::MechanismKind, repo as challenge_repo};
use keyward::error::AuthError;

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("KEYWARD_TEST_DSN") else {
        eprintln!("KEYWARD_TEST_DSN not set; skipping");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await
        .context("failed to connect to the test database")?;
    sqlx::migrate!().run(&pool).await?;
    Ok(Some(pool))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn device_key(seed: u8) -> (SigningKey, String) {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let public = base64::engine::general_purpose::STANDARD
        .encode(signing.verifying_key().to_bytes());
    (signing, public)
}

struct Enrolled {
    auth: AuthService,
    account_id: Uuid,
    username: String,
    device_id: Uuid,
    signing: SigningKey,
}

/// Register an account and verify its first device, enabling two-factor.
async fn enroll(pool: &PgPool, key_seed: u8) -> Result<Enrolled> {
    let auth = AuthService::new(pool.clone(), 3600);
    let username = unique("user");
    let email = format!("{username}@example.com");

    let registered = auth
        .register(&username, &email, &secret("Str0ng!Pass"), &secret("Str0ng!Pass"))
        .await?;
    let account_id = registered.account.id;
    assert!(registered.device_registration_required);

    let (signing, public_key) = device_key(key_seed);
    let start = auth
        .registry()
        .begin_registration(account_id, "laptop", &public_key)
        .await?;
    assert!(
        start.backup_codes.is_some(),
        "first device must issue backup codes"
    );

    let done = auth
        .registry()
        .complete_registration(&start.registration_code, "laptop", &public_key)
        .await?;

    Ok(Enrolled {
        auth,
        account_id,
        username,
        device_id: done.device_id,
        signing,
    })
}

#[tokio::test]
async fn shared_code_login_round_trip() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 11).await?;
    let origin = Origin::default();

    let outcome = enrolled
        .auth
        .login(&enrolled.username, &secret("Str0ng!Pass"), &origin)
        .await?;
    let (challenge_id, code) = match outcome {
        LoginOutcome::RequiresTwoFactor {
            challenge_id,
            verification_code,
            ..
        } => (
            challenge_id,
            verification_code.context("shared-code challenge must carry a code")?,
        ),
        LoginOutcome::Success { .. } => panic!("two-factor account logged in directly"),
    };
    assert_eq!(code.len(), 6);

    // The companion device only knows the account and the relayed code; it
    // resolves the live challenge from those before approving.
    let resolved = enrolled
        .auth
        .engine()
        .resolve_by_code(enrolled.account_id, &code)
        .await?;
    assert_eq!(resolved.id, challenge_id);

    enrolled
        .auth
        .engine()
        .approve(challenge_id, &code, enrolled.device_id, enrolled.account_id)
        .await?;

    let status = enrolled.auth.engine().read(challenge_id).await?;
    assert_eq!(status.status, ChallengeStatus::Approved);

    let completed = enrolled
        .auth
        .complete_login(challenge_id, &code, &origin)
        .await?;
    match completed {
        LoginOutcome::Success { account, session_token } => {
            assert_eq!(account.id, enrolled.account_id);

            // The token resolves to a live session until logout.
            let token_hash = session::hash_session_token(&session_token);
            let record = session::lookup(&pool, &token_hash)
                .await?
                .context("session must resolve after completion")?;
            assert_eq!(record.account_id, enrolled.account_id);
            assert_eq!(record.username, enrolled.username);

            enrolled.auth.logout(&session_token).await?;
            assert!(session::lookup(&pool, &token_hash).await?.is_none());
        }
        LoginOutcome::RequiresTwoFactor { .. } => panic!("completion must yield a session"),
    }

    // The challenge is consumed; a second completion must fail.
    let again = enrolled.auth.complete_login(challenge_id, &code, &origin).await;
    assert!(matches!(again, Err(AuthError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn signed_challenge_approval() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 12).await?;

    let created = enrolled
        .auth
        .engine()
        .create(
            enrolled.account_id,
            Some(enrolled.device_id),
            ChallengePurpose::Login,
            MechanismKind::SignedChallenge,
        )
        .await?;
    let nonce_b64 = created.nonce.context("signed challenge must carry a nonce")?;
    assert_eq!(created.verification_code, None);

    let nonce = base64::engine::general_purpose::STANDARD.decode(&nonce_b64)?;
    let signature = base64::engine::general_purpose::STANDARD
        .encode(enrolled.signing.sign(&nonce).to_bytes());

    enrolled
        .auth
        .engine()
        .approve(
            created.challenge_id,
            &signature,
            enrolled.device_id,
            enrolled.account_id,
        )
        .await?;

    let challenge = enrolled.auth.engine().read(created.challenge_id).await?;
    assert_eq!(challenge.status, ChallengeStatus::Approved);
    Ok(())
}

#[tokio::test]
async fn wrong_proof_rejects_challenge() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 13).await?;

    let created = enrolled
        .auth
        .engine()
        .create(
            enrolled.account_id,
            Some(enrolled.device_id),
            ChallengePurpose::Login,
            MechanismKind::SharedCode,
        )
        .await?;

    let result = enrolled
        .auth
        .engine()
        .approve(
            created.challenge_id,
            "000000",
            enrolled.device_id,
            enrolled.account_id,
        )
        .await;
    assert!(matches!(result, Err(AuthError::Unauthorized(_))));

    // The failed attempt consumed the challenge.
    let challenge = enrolled.auth.engine().read(created.challenge_id).await?;
    assert_eq!(challenge.status, ChallengeStatus::Rejected);
    Ok(())
}

#[tokio::test]
async fn double_approval_single_winner() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 14).await?;

    let created = enrolled
        .auth
        .engine()
        .create(
            enrolled.account_id,
            Some(enrolled.device_id),
            ChallengePurpose::Login,
            MechanismKind::SharedCode,
        )
        .await?;
    let code = created.verification_code.context("missing code")?;

    enrolled
        .auth
        .engine()
        .approve(created.challenge_id, &code, enrolled.device_id, enrolled.account_id)
        .await?;
    let second = enrolled
        .auth
        .engine()
        .approve(created.challenge_id, &code, enrolled.device_id, enrolled.account_id)
        .await;
    assert!(matches!(second, Err(AuthError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn expired_challenge_rejected_and_persisted() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 15).await?;

    // A negative TTL inserts the challenge already past its expiry.
    let challenge = challenge_repo::insert(
        &pool,
        Uuid::new_v4(),
        enrolled.account_id,
        Some(enrolled.device_id),
        ChallengePurpose::Login,
        &ProofMechanism::SharedCode {
            code: "123456".to_string(),
        },
        -1,
    )
    .await?;

    let result = enrolled
        .auth
        .engine()
        .approve(challenge.id, "123456", enrolled.device_id, enrolled.account_id)
        .await;
    assert!(matches!(result, Err(AuthError::Expired)));

    // The lazy transition is persisted, not just computed.
    let read_back = enrolled.auth.engine().read(challenge.id).await?;
    assert_eq!(read_back.status, ChallengeStatus::Expired);
    Ok(())
}

#[tokio::test]
async fn last_device_removal_refused() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 16).await?;

    let result = enrolled
        .auth
        .remove_device(enrolled.account_id, enrolled.device_id)
        .await;
    assert!(matches!(result, Err(AuthError::Conflict(_))));

    // Recovery path: reset to unverified drops two-factor entirely.
    let reset = enrolled
        .auth
        .registry()
        .reset_all_devices_unverified(&enrolled.username)
        .await?;
    assert_eq!(reset, 1);

    let (devices, two_factor) = enrolled
        .auth
        .registry()
        .list_devices(enrolled.account_id)
        .await?;
    assert!(!two_factor);
    assert!(devices.iter().all(|device| !device.verified));

    // No longer the last verified device; removal is now allowed.
    enrolled
        .auth
        .remove_device(enrolled.account_id, enrolled.device_id)
        .await?;
    Ok(())
}

#[tokio::test]
async fn registration_code_single_use() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 17).await?;
    let (_, public_key) = device_key(18);

    let start = enrolled
        .auth
        .registry()
        .begin_registration(enrolled.account_id, "phone", &public_key)
        .await?;
    // Second device: no new backup codes.
    assert!(start.backup_codes.is_none());

    enrolled
        .auth
        .registry()
        .complete_registration(&start.registration_code, "phone", &public_key)
        .await?;
    let replay = enrolled
        .auth
        .registry()
        .complete_registration(&start.registration_code, "phone", &public_key)
        .await;
    assert!(matches!(replay, Err(AuthError::Unauthorized(_))));
    Ok(())
}

#[tokio::test]
async fn expired_registration_code_rejected() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let enrolled = enroll(&pool, 21).await?;
    let (_, public_key) = device_key(22);

    let start = enrolled
        .auth
        .registry()
        .begin_registration(enrolled.account_id, "tablet", &public_key)
        .await?;

    // Push the code past its TTL.
    sqlx::query(
        "UPDATE devices SET registration_code_expires_at = NOW() - INTERVAL '1 second'
         WHERE id = $1",
    )
    .bind(start.device.id)
    .execute(&pool)
    .await?;

    let result = enrolled
        .auth
        .registry()
        .complete_registration(&start.registration_code, "tablet", &public_key)
        .await;
    assert!(matches!(result, Err(AuthError::Unauthorized(_))));

    // The device stays pending; the expired code granted nothing.
    let (devices, _) = enrolled
        .auth
        .registry()
        .list_devices(enrolled.account_id)
        .await?;
    let device = devices
        .iter()
        .find(|device| device.id == start.device.id)
        .context("pending device should still be listed")?;
    assert!(!device.verified);
    Ok(())
}

#[tokio::test]
async fn password_reset_flows() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let auth = AuthService::new(pool.clone(), 3600);
    let origin = Origin::default();

    // No two-factor: straight through.
    let username = unique("plain");
    let email = format!("{username}@example.com");
    auth.register(&username, &email, &secret("Str0ng!Pass"), &secret("Str0ng!Pass"))
        .await?;
    let outcome = auth
        .reset_password(
            &username,
            &email,
            &secret("N3w!Secret"),
            &secret("N3w!Secret"),
            None,
            None,
        )
        .await?;
    assert!(matches!(outcome, ResetOutcome::Done));
    let login = auth.login(&username, &secret("N3w!Secret"), &origin).await?;
    assert!(matches!(login, LoginOutcome::Success { .. }));
    let stale = auth.login(&username, &secret("Str0ng!Pass"), &origin).await;
    assert!(matches!(stale, Err(AuthError::Unauthorized(_))));

    // Two-factor: a reset without a challenge is gated.
    let enrolled = enroll(&pool, 19).await?;
    let email = format!("{}@example.com", enrolled.username);
    let gated = enrolled
        .auth
        .reset_password(
            &enrolled.username,
            &email,
            &secret("N3w!Secret"),
            &secret("N3w!Secret"),
            None,
            None,
        )
        .await?;
    assert!(matches!(gated, ResetOutcome::TwoFactorRequired));

    // A pending password-reset challenge plus its code passes.
    let created = enrolled
        .auth
        .engine()
        .create(
            enrolled.account_id,
            Some(enrolled.device_id),
            ChallengePurpose::PasswordReset,
            MechanismKind::SharedCode,
        )
        .await?;
    let code = created.verification_code.context("missing code")?;
    let done = enrolled
        .auth
        .reset_password(
            &enrolled.username,
            &email,
            &secret("N3w!Secret"),
            &secret("N3w!Secret"),
            Some(created.challenge_id),
            Some(&code),
        )
        .await?;
    assert!(matches!(done, ResetOutcome::Done));

    // The challenge is single-use.
    let challenge = enrolled.auth.engine().read(created.challenge_id).await?;
    assert_eq!(challenge.status, ChallengeStatus::Used);
    Ok(())
}

#[tokio::test]
async fn duplicate_username_conflicts() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let auth = AuthService::new(pool.clone(), 3600);
    let username = unique("dup");
    let email = format!("{username}@example.com");

    auth.register(&username, &email, &secret("Str0ng!Pass"), &secret("Str0ng!Pass"))
        .await?;
    let other_email = format!("other-{email}");
    let result = auth
        .register(&username, &other_email, &secret("Str0ng!Pass"), &secret("Str0ng!Pass"))
        .await;
    assert!(matches!(result, Err(AuthError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn backup_codes_redeem_once() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let auth = AuthService::new(pool.clone(), 3600);
    let username = unique("bkp");
    let email = format!("{username}@example.com");
    let registered = auth
        .register(&username, &email, &secret("Str0ng!Pass"), &secret("Str0ng!Pass"))
        .await?;

    let (_, public_key) = device_key(20);
    let start = auth
        .registry()
        .begin_registration(registered.account.id, "laptop", &public_key)
        .await?;
    let codes = start.backup_codes.context("first device issues backup codes")?;
    assert_eq!(codes.len(), 10);

    let code = &codes[0];
    assert!(keyward::auth::backup::redeem(&pool, registered.account.id, code).await?);
    assert!(!keyward::auth::backup::redeem(&pool, registered.account.id, code).await?);
    Ok(())
}
