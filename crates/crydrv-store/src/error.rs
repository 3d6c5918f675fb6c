//! Error types for the crydrv-store crate

use crydrv_crypto::CryptoError;
use std::io;
use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during blob storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Blob does not exist
    #[error("blob not found")]
    NotFound,

    /// A block failed authentication: wrong key or corrupted blob
    #[error("integrity check failed: wrong key or corrupted data")]
    Integrity,

    /// The plaintext source ended before its declared length
    #[error("source ended early: expected {expected} bytes, got {actual}")]
    SourceTooShort { expected: u64, actual: u64 },

    /// Invalid blob format parameters
    #[error("invalid blob format: {0}")]
    InvalidFormat(String),

    /// Crypto error other than an integrity failure
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// IO error
    #[error("io error: {0}")]
    Io(io::Error),
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Integrity => StoreError::Integrity,
            other => StoreError::Crypto(other),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound;
        }
        // Reader errors travel through `io::Read`; unwrap them again
        match err.get_ref().and_then(|inner| inner.downcast_ref::<StoreError>()) {
            Some(StoreError::Integrity) => StoreError::Integrity,
            _ => StoreError::Io(err),
        }
    }
}

impl From<StoreError> for io::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => e,
            StoreError::NotFound => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
