//! Node key store.
//!
//! Keys are stored as PKCS#1 PEM files: `RSA PRIVATE KEY` for the private key,
//! `RSA PUBLIC KEY` for public keys. A file with any other container or label
//! is rejected as [`IdentityError::KeyFormatInvalid`]. Public keys smaller than
//! [`KEY_BITS`] are still accepted but logged.
//!
//! The local keypair is read from two separate files. The public half is taken
//! from `self.pub` as-is; whether it matches the private key is not checked on
//! load (see [`LocalKeypair::is_paired`]).

use crate::error::{IdentityError, IdentityResult};
use crate::trusted_keys::TrustedKeySet;
use cloudcontrol_core::NodePaths;
use cloudcontrol_crypto::{generate_signing_key, SigningKey, VerifyingKey, KEY_BITS};
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The node's own signing identity.
#[derive(Debug, Clone)]
pub struct LocalKeypair {
    signing_key: SigningKey,
    public_key: VerifyingKey,
}

impl LocalKeypair {
    pub fn new(signing_key: SigningKey, public_key: VerifyingKey) -> Self {
        Self {
            signing_key,
            public_key,
        }
    }

    /// Keypair whose public half is derived from the private key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key.to_public_key();
        Self::new(signing_key, public_key)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Public key as read from the public key file.
    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// True when the stored public key belongs to the private key.
    pub fn is_paired(&self) -> bool {
        self.signing_key.to_public_key() == self.public_key
    }
}

/// Load `self_key/self.key` and `self_key/self.pub` from the node directory.
pub fn load_local_keypair(paths: &NodePaths) -> IdentityResult<LocalKeypair> {
    let signing_key = load_private_key(&paths.self_private_key())?;
    let public_key = load_public_key(&paths.self_public_key())?;
    Ok(LocalKeypair::new(signing_key, public_key))
}

/// Create and persist a new local keypair.
///
/// Both target files are checked before anything is written; if either one
/// already exists nothing is touched.
pub fn generate_local_keypair(paths: &NodePaths) -> IdentityResult<LocalKeypair> {
    let private_path = paths.self_private_key();
    let public_path = paths.self_public_key();
    for path in [&private_path, &public_path] {
        let exists = path
            .try_exists()
            .map_err(|e| IdentityError::from_io(path.clone(), e))?;
        if exists {
            return Err(IdentityError::AlreadyExists { path: path.clone() });
        }
    }

    let key_dir = paths.self_key_dir();
    create_private_dir(&key_dir).map_err(|e| IdentityError::from_io(key_dir.clone(), e))?;

    let signing_key = generate_signing_key().map_err(|e| IdentityError::KeyGeneration {
        reason: e.to_string(),
    })?;
    let keypair = LocalKeypair::from_signing_key(signing_key);
    write_private_key(&private_path, keypair.signing_key())?;
    write_public_key(&public_path, keypair.public_key())?;

    info!(
        private_key = %private_path.display(),
        public_key = %public_path.display(),
        "Generated local keypair"
    );
    Ok(keypair)
}

/// Parse a PKCS#1 PEM private key file.
pub fn load_private_key(path: &Path) -> IdentityResult<SigningKey> {
    let pem = read_pem(path)?;
    <SigningKey as DecodeRsaPrivateKey>::from_pkcs1_pem(&pem).map_err(|e| {
        IdentityError::KeyFormatInvalid {
            path: path.to_path_buf(),
            reason: format!("expected an RSA PRIVATE KEY: {}", e),
        }
    })
}

/// Parse a PKCS#1 PEM public key file.
pub fn load_public_key(path: &Path) -> IdentityResult<VerifyingKey> {
    let pem = read_pem(path)?;
    let key = <VerifyingKey as DecodeRsaPublicKey>::from_pkcs1_pem(&pem).map_err(|e| {
        IdentityError::KeyFormatInvalid {
            path: path.to_path_buf(),
            reason: format!("expected an RSA PUBLIC KEY: {}", e),
        }
    })?;
    let bits = key.size() * 8;
    if bits < KEY_BITS {
        warn!(path = %path.display(), bits, "Public key is smaller than {} bits", KEY_BITS);
    }
    Ok(key)
}

/// Load every public key below `dir`.
///
/// Subdirectories are descended into; every other entry must be a valid
/// public key file. One bad file fails the whole load, so a partial trust set
/// is never returned.
pub fn load_trusted_keys(dir: &Path) -> IdentityResult<TrustedKeySet> {
    let mut files = Vec::new();
    collect_key_files(dir, &mut files)?;

    let mut keys = Vec::with_capacity(files.len());
    for path in &files {
        keys.push(load_public_key(path)?);
        debug!(path = %path.display(), "Loaded trusted key");
    }

    info!(dir = %dir.display(), count = keys.len(), "Loaded trusted key set");
    Ok(TrustedKeySet::new(keys))
}

fn collect_key_files(dir: &Path, files: &mut Vec<PathBuf>) -> IdentityResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| IdentityError::from_io(dir.to_path_buf(), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IdentityError::from_io(dir.to_path_buf(), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| IdentityError::from_io(entry.path(), e))?;
        paths.push((entry.path(), file_type.is_dir()));
    }
    paths.sort();

    for (path, is_dir) in paths {
        if is_dir {
            collect_key_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Write a private key as PKCS#1 PEM, refusing to overwrite.
pub fn write_private_key(path: &Path, signing_key: &SigningKey) -> IdentityResult<()> {
    let pem = EncodeRsaPrivateKey::to_pkcs1_pem(signing_key, LineEnding::LF)
        .map_err(|e| IdentityError::KeyFormatInvalid {
            path: path.to_path_buf(),
            reason: format!("cannot encode private key to PEM: {}", e),
        })?;
    write_new_file(path, pem.as_bytes())
}

/// Write a public key as PKCS#1 PEM, refusing to overwrite.
pub fn write_public_key(path: &Path, public_key: &VerifyingKey) -> IdentityResult<()> {
    let pem = EncodeRsaPublicKey::to_pkcs1_pem(public_key, LineEnding::LF)
        .map_err(|e| IdentityError::KeyFormatInvalid {
            path: path.to_path_buf(),
            reason: format!("cannot encode public key to PEM: {}", e),
        })?;
    write_new_file(path, pem.as_bytes())
}

fn read_pem(path: &Path) -> IdentityResult<String> {
    let bytes = fs::read(path).map_err(|e| IdentityError::from_io(path.to_path_buf(), e))?;
    String::from_utf8(bytes).map_err(|_| IdentityError::KeyFormatInvalid {
        path: path.to_path_buf(),
        reason: "not a PEM text file".to_string(),
    })
}

fn write_new_file(path: &Path, contents: &[u8]) -> IdentityResult<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| IdentityError::from_io(path.to_path_buf(), e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| IdentityError::from_io(path.to_path_buf(), e))
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
