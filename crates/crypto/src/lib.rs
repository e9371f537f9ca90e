//! Cryptographic primitives for CloudControl.
//!
//! This crate provides the signing foundation of the node protocol: key
//! generation, signing of request payloads, verification against a public key,
//! and the text encoding used to carry signatures in request headers.
//!
//! # Algorithms
//!
//! - **Signatures**: RSASSA-PKCS1-v1_5 with SHA-256, 4096-bit keys
//! - **Transport encoding**: base64 (standard alphabet, padded)
//!
//! # Security Principles
//!
//! - Private keys never leave the process
//! - Secrets are never logged
//! - Verification never errors; it answers yes or no

pub mod keys;
pub mod signing;

pub use keys::{generate_signing_key, SigningKey, VerifyingKey, KEY_BITS};
pub use signing::{
    decode_signature, encode_signature, payload_digest, sign, verify, SigningError,
    SIGNATURE_LENGTH,
};
