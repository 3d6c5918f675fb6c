//! Key derivation hierarchy
//!
//! ```text
//! RootSecret ──HKDF(username)──▶ UserSalt
//! password ──Argon2id(UserSalt)──▶ ContentKey
//! ContentKey ──HKDF(UserSalt)──▶ Fingerprint
//! ContentKey ──HKDF(UserSalt ‖ path)──▶ StorageName
//! ```
//!
//! Every HKDF step uses SHA-512/256 and its own `info` label, so no two
//! derivations share a (key, context) pair even when their inputs coincide.

use crate::{
    encoding::{str_decode, str_encode},
    CryptoError, Result, DERIVED_SIZE, ENCODED_SIZE, KEY_SIZE,
};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha512_256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const USER_SALT_INFO: &[u8] = b"crydrv:user-salt:v1";
const FINGERPRINT_INFO: &[u8] = b"crydrv:fingerprint:v1";
const STORAGE_NAME_INFO: &[u8] = b"crydrv:storage-name:v1";

fn hkdf_expand(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; DERIVED_SIZE] {
    let hkdf = Hkdf::<Sha512_256>::new(Some(salt), ikm);
    let mut out = [0u8; DERIVED_SIZE];
    hkdf.expand(info, &mut out)
        .expect("one digest worth of output is always a valid HKDF length");
    out
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "{} must be {} bytes, got {}",
            what,
            N,
            bytes.len()
        ))
    })
}

/// Process-wide root secret, loaded once from configuration
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootSecret {
    bytes: [u8; DERIVED_SIZE],
}

impl RootSecret {
    /// Generate a new random root secret
    pub fn generate() -> Self {
        let mut bytes = [0u8; DERIVED_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            bytes: fixed(bytes, "root secret")?,
        })
    }

    /// Decode from the base64url form used in configuration
    pub fn from_encoded(s: &str) -> Result<Self> {
        Self::from_bytes(&str_decode(s.trim())?)
    }

    /// Encode as base64url (only ever shown when suggesting a fresh secret)
    pub fn to_encoded(&self) -> String {
        str_encode(self.bytes)
    }

    /// Get the secret bytes
    pub fn as_bytes(&self) -> &[u8; DERIVED_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootSecret([REDACTED])")
    }
}

/// Per-user salt, stable across logins for a username
#[derive(Clone, PartialEq, Eq)]
pub struct UserSalt([u8; DERIVED_SIZE]);

impl UserSalt {
    /// Get the salt bytes
    pub fn as_bytes(&self) -> &[u8; DERIVED_SIZE] {
        &self.0
    }
}

impl fmt::Debug for UserSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserSalt(..)")
    }
}

/// The per-user symmetric key securing file contents and storage names.
///
/// Equivalent in sensitivity to the user's password. Zeroized on drop and
/// never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    key: [u8; KEY_SIZE],
}

impl ContentKey {
    /// Create a content key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: fixed(bytes, "content key")?,
        })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Wrap this key into a session token for the client to replay
    pub fn to_token(&self) -> SessionToken {
        SessionToken(str_encode(self.key))
    }

    /// Recover a content key from a presented session token.
    ///
    /// The token must decode as base64url and be exactly [`KEY_SIZE`] bytes.
    pub fn from_token(token: &str) -> Result<Self> {
        if token.len() != ENCODED_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "session token must be {} characters, got {}",
                ENCODED_SIZE,
                token.len()
            )));
        }
        let mut bytes = str_decode(token)?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey([REDACTED])")
    }
}

/// Opaque session token: the encoded content key.
///
/// Bearer-equivalent to the password; only meaningful together with the
/// username it was issued for.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionToken(String);

impl SessionToken {
    /// Get the wire representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// One-way identifier of a (username, password) pair, safe to log and store
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; DERIVED_SIZE]);

impl Fingerprint {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(fixed(bytes, "fingerprint")?))
    }

    /// Decode from base64url
    pub fn from_encoded(s: &str) -> Result<Self> {
        Self::from_bytes(&str_decode(s)?)
    }

    /// Encode as base64url
    pub fn to_encoded(&self) -> String {
        str_encode(self.0)
    }

    /// Get the fingerprint bytes
    pub fn as_bytes(&self) -> &[u8; DERIVED_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_encoded())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_encoded())
    }
}

/// Obfuscated on-disk identifier of a (user, logical path) pair
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageName(String);

impl StorageName {
    /// Get the encoded name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StorageName(..)")
    }
}

impl AsRef<str> for StorageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / passes (default: 3)
    pub time_cost: u32,
    /// Parallelism / lanes (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive the salt of `username` under the process root secret
pub fn derive_user_salt(root: &RootSecret, username: &str) -> UserSalt {
    UserSalt(hkdf_expand(
        root.as_bytes(),
        username.as_bytes(),
        USER_SALT_INFO,
    ))
}

/// Derive the content key from a password with Argon2id.
///
/// Deliberately expensive (64 MiB, 3 passes with the default parameters);
/// call it from a blocking context.
pub fn derive_password_key(
    password: &str,
    salt: &UserSalt,
    params: &KdfParams,
) -> Result<ContentKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let start = std::time::Instant::now();
    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id failed: {e}")))?;
    tracing::debug!(
        elapsed_ms = %start.elapsed().as_millis(),
        "Derived content key"
    );

    let content_key = ContentKey { key };
    key.zeroize();
    Ok(content_key)
}

/// Derive the login fingerprint used for allowlist lookups
pub fn derive_fingerprint(key: &ContentKey, salt: &UserSalt) -> Fingerprint {
    Fingerprint(hkdf_expand(key.as_bytes(), salt.as_bytes(), FINGERPRINT_INFO))
}

/// Derive the storage name of `logical_path` for this user
pub fn derive_storage_name(key: &ContentKey, salt: &UserSalt, logical_path: &str) -> StorageName {
    let context = [salt.as_bytes().as_slice(), logical_path.as_bytes()].concat();
    StorageName(str_encode(hkdf_expand(
        key.as_bytes(),
        &context,
        STORAGE_NAME_INFO,
    )))
}
