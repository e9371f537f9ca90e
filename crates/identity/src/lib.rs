//! Key material for CloudControl nodes.
//!
//! Every node owns one signing keypair and trusts a fixed set of peer public
//! keys. Both are loaded once at startup from the node directory and are
//! read-only for the lifetime of the process; there is no rotation, reload or
//! revocation.
//!
//! # Node directory
//!
//! - `self_key/self.key`: PKCS#1 PEM RSA private key
//! - `self_key/self.pub`: PKCS#1 PEM RSA public key
//! - `authorized_keys/**`: one PKCS#1 PEM public key per trusted peer

pub mod error;
pub mod key_store;
pub mod trusted_keys;

pub use error::{IdentityError, IdentityResult};
pub use key_store::{
    generate_local_keypair, load_local_keypair, load_private_key, load_public_key,
    load_trusted_keys, write_private_key, write_public_key, LocalKeypair,
};
pub use trusted_keys::TrustedKeySet;
