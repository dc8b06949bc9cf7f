//! Argon2id password hashing.
//!
//! One scheme everywhere: PHC-format Argon2id strings with a per-account
//! random salt. Verification goes through the same primitive, which compares
//! in constant time; raw secrets are never persisted or compared as strings.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

/// Hash a secret for storage.
///
/// # Errors
/// Returns an error if Argon2id hashing fails.
pub fn hash_secret(secret: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.expose_secret().as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash secret"))?
        .to_string();
    Ok(hash)
}

/// Verify a secret against a stored PHC hash.
///
/// # Errors
/// Returns an error if the stored hash is not parseable; a wrong secret is
/// `Ok(false)`, not an error.
pub fn verify_secret(secret: &SecretString, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid stored hash"))?;
    Ok(Argon2::default()
        .verify_password(secret.expose_secret().as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() -> Result<()> {
        let secret = SecretString::from("Str0ng!Pass".to_string());
        let hash = hash_secret(&secret)?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret(&secret, &hash)?);
        Ok(())
    }

    #[test]
    fn wrong_secret_is_rejected() -> Result<()> {
        let hash = hash_secret(&SecretString::from("Str0ng!Pass".to_string()))?;
        assert!(!verify_secret(&SecretString::from("Wr0ng!Pass".to_string()), &hash)?);
        Ok(())
    }

    #[test]
    fn salts_differ_between_hashes() -> Result<()> {
        let secret = SecretString::from("Str0ng!Pass".to_string());
        let first = hash_secret(&secret)?;
        let second = hash_secret(&secret)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        assert!(verify_secret(&SecretString::from("x".to_string()), "plaintext-from-old-snapshot").is_err());
    }
}
