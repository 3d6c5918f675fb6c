//! Block cipher codec using AES-256-GCM
//!
//! Each plaintext chunk is sealed independently. A fresh 96-bit nonce is drawn
//! from the OS random generator on every call and prefixed to the output:
//!
//! ```text
//! ┌───────────┬──────────────────────┬──────────┐
//! │ nonce(12) │ ciphertext(len(p))   │ tag(16)  │
//! └───────────┴──────────────────────┴──────────┘
//! ```
//!
//! Callers never supply nonces, so nonce reuse cannot be introduced by a
//! caller's bookkeeping. The 96-bit random nonce bounds how many blocks one
//! content key should seal before collisions become plausible (birthday bound
//! around 2^48 blocks); no limit is enforced.

use crate::{keys::ContentKey, CryptoError, Result, NONCE_SIZE, TAG_SIZE};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;

/// Bytes added to every plaintext chunk: nonce plus authentication tag
pub const BLOCK_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

fn cipher(key: &ContentKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Encrypt one block under a fresh random nonce, returning `nonce ‖ sealed`
pub fn encrypt_block(key: &ContentKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::try_fill_bytes(&mut OsRng, &mut nonce)
        .map_err(|e| CryptoError::Random(e.to_string()))?;

    let sealed = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut block = Vec::with_capacity(NONCE_SIZE + sealed.len());
    block.extend_from_slice(&nonce);
    block.extend_from_slice(&sealed);
    Ok(block)
}

/// Verify and decrypt one `nonce ‖ sealed` block.
///
/// Any failure, including input too short to hold a nonce and a tag, is
/// reported as [`CryptoError::Integrity`].
pub fn decrypt_block(key: &ContentKey, block: &[u8]) -> Result<Vec<u8>> {
    if block.len() < BLOCK_OVERHEAD {
        return Err(CryptoError::Integrity);
    }
    let (nonce, sealed) = block.split_at(NONCE_SIZE);
    cipher(key)?
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Integrity)
}
