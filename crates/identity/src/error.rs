//! Error types for CloudControl key store operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or creating key material.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A required key file or key directory does not exist
    #[error("Key file missing: '{}'", .path.display())]
    KeyFileMissing { path: PathBuf },

    /// A key file exists but does not hold a key of the expected kind
    #[error("Invalid key file '{}': {reason}", .path.display())]
    KeyFormatInvalid { path: PathBuf, reason: String },

    /// The random key generator failed
    #[error("Key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// Refusing to overwrite existing key material
    #[error("Key file already exists: '{}'", .path.display())]
    AlreadyExists { path: PathBuf },

    /// Any other filesystem failure
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IdentityError {
    pub(crate) fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => IdentityError::KeyFileMissing { path },
            std::io::ErrorKind::AlreadyExists => IdentityError::AlreadyExists { path },
            _ => IdentityError::Io { path, source },
        }
    }
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
