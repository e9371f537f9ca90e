//! Request signing and verification.
//!
//! Every privileged request between nodes carries a signature over the exact
//! bytes of its body. The scheme is:
//!
//! 1. `digest = SHA-256(payload)`
//! 2. `signature = RSASSA-PKCS1-v1_5-Sign(private_key, SHA-256, digest)`
//!
//! Verification recomputes the digest over the bytes that were received and
//! checks the signature against a public key. The payload is never decoded and
//! re-encoded in between, so JSON field order and whitespace cannot cause a
//! mismatch.
//!
//! On the wire the signature travels as standard, padded base64 in a single
//! request header.

use crate::keys::{SigningKey, VerifyingKey, KEY_BITS};
use base64::engine::general_purpose;
use base64::Engine as _;
use rand::rngs::OsRng;
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a signature made with a [`KEY_BITS`] key, in bytes.
pub const SIGNATURE_LENGTH: usize = KEY_BITS / 8;

/// Errors that can occur during signing operations.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The underlying signature primitive failed.
    #[error("Cryptographic error: {reason}")]
    Crypto { reason: String },

    /// A transported signature was not valid base64.
    #[error("Invalid signature encoding: {reason}")]
    Encoding { reason: String },
}

/// SHA-256 digest of the payload; this is what actually gets signed.
pub fn payload_digest(payload: &[u8]) -> [u8; 32] {
    Sha256::digest(payload).into()
}

/// Sign `payload` with the node's private key.
///
/// Returns the raw signature bytes. Fails only if the signature primitive
/// itself reports a fault; the error is never swallowed.
pub fn sign(payload: &[u8], signing_key: &SigningKey) -> Result<Vec<u8>, SigningError> {
    let digest = payload_digest(payload);
    signing_key
        .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| SigningError::Crypto {
            reason: format!("cannot sign message: {}", e),
        })
}

/// Check `signature` over `payload` against `public_key`.
///
/// Any failure, including signature bytes of the wrong length, yields `false`.
pub fn verify(payload: &[u8], signature: &[u8], public_key: &VerifyingKey) -> bool {
    let digest = payload_digest(payload);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .is_ok()
}

/// Text-safe form of a signature for the request header.
pub fn encode_signature(signature: &[u8]) -> String {
    general_purpose::STANDARD.encode(signature)
}

/// Inverse of [`encode_signature`].
pub fn decode_signature(encoded: &str) -> Result<Vec<u8>, SigningError> {
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SigningError::Encoding {
            reason: e.to_string(),
        })
}
