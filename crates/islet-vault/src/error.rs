//! Vault-related error types.

use thiserror::Error;

/// Errors that can occur in the credential vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Filesystem I/O failed.
    #[error("vault i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption or decryption failed.
    #[error("vault crypto error: {0}")]
    Crypto(String),

    /// The on-disk blob is malformed.
    #[error("vault blob malformed: {0}")]
    MalformedBlob(String),

    /// The blob version is not supported.
    #[error("unsupported vault version: {0}")]
    UnsupportedVersion(u32),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
