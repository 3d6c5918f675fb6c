//! Gateway configuration

use crydrv_crypto::encoding::is_encoding_char;
use crydrv_crypto::{Fingerprint, KdfParams, RootSecret};
use crydrv_store::BlobFormat;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal startup configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing env var SECRET_KEY; here is a freshly generated one: SECRET_KEY={suggestion}")]
    MissingSecretKey { suggestion: String },

    #[error("SECRET_KEY must be 32 bytes of unpadded base64url")]
    InvalidSecretKey,

    #[error("USERS_ALLOWLIST contains an invalid fingerprint: {0}")]
    InvalidAllowlistEntry(String),

    #[error("MIN_PASSWORD_LENGTH must be greater than zero")]
    InvalidMinPasswordLength,
}

/// Fingerprints permitted to log in when registration is closed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allowlist {
    fingerprints: HashSet<Fingerprint>,
}

impl Allowlist {
    /// Parse fingerprints separated by any run of non-base64url characters
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let fingerprints = s
            .split(|c: char| !is_encoding_char(c))
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                Fingerprint::from_encoded(entry)
                    .map_err(|_| ConfigError::InvalidAllowlistEntry(entry.to_string()))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { fingerprints })
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl FromIterator<Fingerprint> for Allowlist {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            fingerprints: iter.into_iter().collect(),
        }
    }
}

/// Who may log in
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Any username/password pair gets its own namespace
    Open,
    /// Only allowlisted fingerprints, all sharing the data directory
    Closed(Allowlist),
}

/// Gateway server configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Storage root
    pub data_dir: PathBuf,
    /// Server-wide secret all user salts derive from
    pub root_secret: RootSecret,
    /// Open or allowlist-only login
    pub registration: Registration,
    /// Minimum password length in characters
    pub min_password_length: usize,
    /// Session cookie lifetime
    pub cookie_lifetime: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: u64,
    /// Argon2id cost parameters
    pub kdf_params: KdfParams,
    /// Blob block geometry
    pub blob_format: BlobFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: PathBuf::from("./www"),
            root_secret: RootSecret::generate(),
            registration: Registration::Closed(Allowlist::default()),
            min_password_length: 16,
            cookie_lifetime: Duration::from_secs(24 * 60 * 60),
            max_body_size: 5 * 1024 * 1024 * 1024, // 5 GiB
            kdf_params: KdfParams::default(),
            blob_format: BlobFormat::default(),
        }
    }
}

impl GatewayConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Body limit for the router, saturating where `usize` is narrower
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_body_size).unwrap_or(usize::MAX)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_password_length == 0 {
            return Err(ConfigError::InvalidMinPasswordLength);
        }
        Ok(())
    }
}

/// Decode the SECRET_KEY value
pub fn parse_secret_key(value: Option<&str>) -> Result<RootSecret, ConfigError> {
    match value.map(str::trim) {
        None | Some("") => Err(ConfigError::MissingSecretKey {
            suggestion: RootSecret::generate().to_encoded(),
        }),
        Some(encoded) => {
            RootSecret::from_encoded(encoded).map_err(|_| ConfigError::InvalidSecretKey)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_allowlist_any_separator() {
        let a = fingerprint(1).to_encoded();
        let b = fingerprint(2).to_encoded();
        let list = Allowlist::parse(&format!("  {a},\n{b} ;; ")).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(&fingerprint(1)));
        assert!(list.contains(&fingerprint(2)));
        assert!(!list.contains(&fingerprint(3)));
    }

    #[test]
    fn test_allowlist_empty() {
        assert!(Allowlist::parse("").unwrap().is_empty());
        assert!(Allowlist::parse(" , \n").unwrap().is_empty());
    }

    #[test]
    fn test_allowlist_rejects_short_entry() {
        let err = Allowlist::parse("abc").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAllowlistEntry(e) if e == "abc"));
    }

    #[test]
    fn test_missing_secret_key_suggests_one() {
        let err = parse_secret_key(None).unwrap_err();
        let ConfigError::MissingSecretKey { suggestion } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(RootSecret::from_encoded(suggestion).is_ok());
        assert!(err.to_string().contains(suggestion.as_str()));
        assert!(matches!(
            parse_secret_key(Some("  ")),
            Err(ConfigError::MissingSecretKey { .. })
        ));
    }

    #[test]
    fn test_secret_key_validation() {
        let root = RootSecret::generate();
        let parsed = parse_secret_key(Some(&root.to_encoded())).unwrap();
        assert_eq!(parsed.as_bytes(), root.as_bytes());
        assert!(matches!(
            parse_secret_key(Some("dG9vc2hvcnQ")),
            Err(ConfigError::InvalidSecretKey)
        ));
    }

    #[test]
    fn test_zero_min_password_length_rejected() {
        let config = GatewayConfig {
            min_password_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMinPasswordLength)
        ));
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bind_addr() {
        let config = GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 9999,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9999");
    }

    #[test]
    fn test_body_limit() {
        let config = GatewayConfig::default();
        assert_eq!(config.max_body_size, 5 << 30);
        assert_eq!(
            config.body_limit(),
            usize::try_from(5u64 << 30).unwrap_or(usize::MAX)
        );

        let huge = GatewayConfig {
            max_body_size: u64::MAX,
            ..Default::default()
        };
        assert_eq!(huge.body_limit(), usize::MAX);
    }
}
