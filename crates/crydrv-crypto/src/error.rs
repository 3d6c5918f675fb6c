//! Error types for the crydrv-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Authenticated decryption failed: wrong key, truncated or tampered block
    #[error("integrity check failed: wrong key or corrupted data")]
    Integrity,

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Password hashing failed (bad Argon2id parameters)
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Random number generator failure
    #[error("random generator failed: {0}")]
    Random(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
