//! Proof verification for the two challenge mechanisms.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use subtle::ConstantTimeEq;

use crate::error::{AuthError, AuthResult};

/// Decode a device's stored public key (base64, 32-byte Ed25519).
///
/// # Errors
/// `Validation` when the material is not a usable key.
pub fn decode_public_key(encoded: &str) -> AuthResult<VerifyingKey> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::Validation("invalid public key encoding".to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::Validation("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| AuthError::Validation("invalid Ed25519 public key".to_string()))
}

/// Verify a signed-challenge response: `proof` is the base64 signature over
/// the challenge nonce.
#[must_use]
pub fn signature_matches(public_key: &VerifyingKey, nonce: &[u8], proof: &str) -> bool {
    let Ok(bytes) = STANDARD.decode(proof.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    public_key.verify_strict(nonce, &signature).is_ok()
}

/// Constant-time comparison for the shared-code mechanism. Length leaks are
/// irrelevant here (codes are always six digits) but the comparison itself
/// must not be.
#[must_use]
pub fn code_matches(expected: &str, supplied: &str) -> bool {
    let supplied = supplied.trim();
    if expected.len() != supplied.len() {
        return false;
    }
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
