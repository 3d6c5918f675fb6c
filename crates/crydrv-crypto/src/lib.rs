//! # crydrv Crypto
//!
//! Cryptographic primitives for the crydrv encrypted file store.
//!
//! This crate provides:
//! - **Key hierarchy**: root secret → per-user salt → Argon2id content key →
//!   fingerprint and per-path storage names, all HKDF/SHA-512/256 based
//! - **Block codec**: AES-256-GCM sealing of independent plaintext chunks with
//!   a fresh random nonce prefixed to every block
//! - **Encoding**: URL-safe, unpadded base64 used for every textual artifact
//!
//! ## Security Model
//!
//! - The content key is the only secret needed to read a user's files and to
//!   locate them; it is never written to disk
//! - Storage names reveal nothing about the logical path or its owner
//! - Every block is authenticated; a wrong key or a flipped bit is reported as
//!   [`CryptoError::Integrity`], never as garbage plaintext
//!
//! ## Example
//!
//! ```rust,ignore
//! use crydrv_crypto::{RootSecret, KdfParams, keys, symmetric};
//!
//! let root = RootSecret::generate();
//! let salt = keys::derive_user_salt(&root, "alice");
//! let key = keys::derive_password_key("correcthorsebatterystaple", &salt, &KdfParams::default())?;
//! let name = keys::derive_storage_name(&key, &salt, "/notes.txt");
//!
//! let block = symmetric::encrypt_block(&key, b"hello")?;
//! assert_eq!(symmetric::decrypt_block(&key, &block)?, b"hello");
//! ```

pub mod encoding;
pub mod error;
pub mod keys;
pub mod symmetric;

pub use encoding::{str_decode, str_encode};
pub use error::{CryptoError, Result};
pub use keys::{
    ContentKey, Fingerprint, KdfParams, RootSecret, SessionToken, StorageName, UserSalt,
};
pub use symmetric::{decrypt_block, encrypt_block, BLOCK_OVERHEAD};

/// Size of every derived secret in bytes (the SHA-512/256 digest size)
pub const DERIVED_SIZE: usize = 32;

/// Size of a content key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Length of a 32-byte value once base64url-encoded without padding
pub const ENCODED_SIZE: usize = 43;
