//! Ed25519 signature verification
//!
//! Devices prove possession of their private key by signing the raw bytes
//! of a challenge nonce. Public keys and signatures travel base64-encoded;
//! the key is opaque until this point.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::{Error, Result};

/// Verify a signature from a base64-encoded public key
///
/// # Errors
///
/// Returns error if the public key or signature format is invalid
pub fn verify_signature(public_key: &str, payload: &[u8], signature: &str) -> Result<bool> {
    let public_key_bytes = base64_decode(public_key)?;
    let verifying_key = VerifyingKey::try_from(public_key_bytes.as_slice())
        .map_err(|e| Error::Authentication(format!("invalid public key: {e}")))?;

    let sig_bytes = base64_decode(signature)?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| Error::Authentication(format!("invalid signature format: {e}")))?;

    Ok(verifying_key.verify(payload, &signature).is_ok())
}

/// Verify a device's signature over a challenge nonce.
///
/// Every failure mode — malformed key, malformed signature, or a signature
/// that does not verify — collapses into the same `Verification` error, so
/// a caller can tell "identity wrong" from "challenge unknown" without
/// learning why the signature was bad.
///
/// # Errors
///
/// Returns `Verification` unless the signature checks out
pub fn verify_challenge_signature(public_key: &str, nonce: &str, signature: &str) -> Result<()> {
    match verify_signature(public_key, nonce.as_bytes(), signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::Verification),
        Err(e) => {
            tracing::debug!(error = %e, "signature verification rejected malformed input");
            Err(Error::Verification)
        }
    }
}

fn base64_decode(data: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::Authentication(format!("invalid base64: {e}")))
}
