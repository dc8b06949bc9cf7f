//! Verification code, challenge id and backup code generation.
//!
//! Everything here draws from the operating system RNG; if that source fails
//! the error propagates instead of degrading to a weaker generator.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

const CODE_MIN: u64 = 100_000;
const CODE_SPAN: u64 = 900_000;
const BACKUP_CODE_GROUPS: usize = 3;
const BACKUP_CODE_GROUP_SIZE: usize = 4;

/// Generate a 6-digit numeric verification code, uniform over
/// [100000, 999999].
pub fn generate_code() -> Result<String> {
    let mut bytes = [0u8; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate verification code")?;
    let value = CODE_MIN + u64::from_be_bytes(bytes) % CODE_SPAN;
    Ok(value.to_string())
}

/// Opaque unique challenge identifier.
#[must_use]
pub fn generate_challenge_id() -> Uuid {
    Uuid::new_v4()
}

/// Random nonce for the signed-challenge mechanism.
pub fn generate_nonce() -> Result<[u8; 32]> {
    let mut nonce = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut nonce)
        .context("failed to generate challenge nonce")?;
    Ok(nonce)
}

/// Generate `count` single-use backup codes, each formatted as dash-joined
/// groups of lowercase hex characters (e.g. `a3f9-0b7c-5e21`).
pub fn generate_backup_codes(count: usize) -> Result<Vec<String>> {
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        codes.push(generate_backup_code()?);
    }
    Ok(codes)
}

fn generate_backup_code() -> Result<String> {
    let mut raw = [0u8; BACKUP_CODE_GROUPS * BACKUP_CODE_GROUP_SIZE / 2];
    OsRng
        .try_fill_bytes(&mut raw)
        .context("failed to generate backup code")?;
    let hex: String = raw.iter().map(|byte| format!("{byte:02x}")).collect();
    let groups: Vec<&str> = hex
        .as_bytes()
        .chunks(BACKUP_CODE_GROUP_SIZE)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect();
    Ok(groups.join("-"))
}

/// Normalize a user-supplied backup code for verification.
#[must_use]
pub fn normalize_backup_code(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}
