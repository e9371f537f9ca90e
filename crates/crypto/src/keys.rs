//! Cryptographic key management

use crate::signing::SigningError;
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Modulus size of every key this crate generates.
pub const KEY_BITS: usize = 4096;

/// A node's private signing key.
pub type SigningKey = RsaPrivateKey;

/// A public key used to check request signatures.
pub type VerifyingKey = RsaPublicKey;

/// Generate a fresh 4096-bit RSA signing key from the OS random source.
///
/// Prime search takes a noticeable amount of time; callers on an async
/// runtime should not hold a worker thread for it on a hot path.
pub fn generate_signing_key() -> Result<SigningKey, SigningError> {
    RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(|e| SigningError::Crypto {
        reason: format!("cannot generate key: {}", e),
    })
}
