//! The set of peer public keys a node accepts commands from.

use cloudcontrol_crypto::{verify, VerifyingKey};

/// Unordered, immutable collection of trusted public keys.
///
/// Membership is all that matters: a signature is accepted if any key in the
/// set verifies it, and which key matched is not reported.
#[derive(Debug, Clone, Default)]
pub struct TrustedKeySet {
    keys: Vec<VerifyingKey>,
}

impl TrustedKeySet {
    pub fn new(keys: Vec<VerifyingKey>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &VerifyingKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerifyingKey> {
        self.keys.iter()
    }

    /// True if `signature` over `payload` verifies under any trusted key.
    pub fn verify_any(&self, payload: &[u8], signature: &[u8]) -> bool {
        self.keys.iter().any(|key| verify(payload, signature, key))
    }
}

impl FromIterator<VerifyingKey> for TrustedKeySet {
    fn from_iter<I: IntoIterator<Item = VerifyingKey>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
