//! Authentication and session binding
//!
//! Every request carries HTTP Basic credentials. The first request derives the
//! content key from the password with Argon2id and hands it back as the
//! `crydrv` session cookie; later requests present that cookie together with
//! the username and skip the expensive derivation. The cookie is worth as
//! much as the password and is only honoured alongside the username, since
//! the username alone selects the salt.

use crate::config::Registration;
use crate::{ApiError, AppState, GatewayConfig};
use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use crydrv_crypto::keys::{
    derive_fingerprint, derive_password_key, derive_storage_name, derive_user_salt,
};
use crydrv_crypto::{
    ContentKey, CryptoError, Fingerprint, KdfParams, RootSecret, SessionToken, UserSalt,
};
use crydrv_store::storage_path;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session cookie name
pub const SESSION_COOKIE: &str = "crydrv";

/// Authentication failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid credentials format")]
    Format,

    #[error("invalid key in cookie")]
    TokenFormat,

    #[error("unauthorized account")]
    Forbidden,

    #[error("key derivation failed: {0}")]
    KeyDerivation(CryptoError),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Format | Self::TokenFormat => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::KeyDerivation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What a request presented
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A successfully authenticated request
#[derive(Debug)]
pub struct AuthorizedContext {
    pub key: ContentKey,
    pub salt: UserSalt,
    pub fingerprint: Fingerprint,
    /// Directory this user's blobs live under
    pub namespace: PathBuf,
    /// Set when the key came from the password, to be handed back as a cookie
    pub issued_token: Option<SessionToken>,
}

impl AuthorizedContext {
    /// On-disk location of the blob for `logical_path`
    pub fn storage_path(&self, logical_path: &str) -> PathBuf {
        let name = derive_storage_name(&self.key, &self.salt, logical_path);
        storage_path(&self.namespace, &name)
    }
}

/// Turns credentials into a content key and a namespace
pub struct Authenticator {
    root_secret: RootSecret,
    registration: Registration,
    data_dir: PathBuf,
    min_password_length: usize,
    kdf_params: KdfParams,
}

impl Authenticator {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            root_secret: config.root_secret.clone(),
            registration: config.registration.clone(),
            data_dir: config.data_dir.clone(),
            min_password_length: config.min_password_length,
            kdf_params: config.kdf_params.clone(),
        }
    }

    /// Authenticate one request.
    ///
    /// Blocks for the Argon2id derivation when no session token is presented.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<AuthorizedContext, AuthError> {
        let token = credentials.token.as_deref();
        if credentials.username.is_empty()
            || (token.is_none()
                && credentials.password.chars().count() < self.min_password_length)
        {
            return Err(AuthError::Format);
        }

        let salt = derive_user_salt(&self.root_secret, &credentials.username);
        let (key, issued_token) = match token {
            Some(token) => {
                let key = ContentKey::from_token(token).map_err(|_| AuthError::TokenFormat)?;
                (key, None)
            }
            None => {
                let key = derive_password_key(&credentials.password, &salt, &self.kdf_params)
                    .map_err(AuthError::KeyDerivation)?;
                let token = key.to_token();
                (key, Some(token))
            }
        };

        let fingerprint = derive_fingerprint(&key, &salt);
        let namespace = match &self.registration {
            Registration::Open => self.data_dir.join(fingerprint.to_encoded()),
            Registration::Closed(allowlist) => {
                if !allowlist.contains(&fingerprint) {
                    warn!(
                        %fingerprint,
                        "Login refused; add this fingerprint to USERS_ALLOWLIST to grant access"
                    );
                    return Err(AuthError::Forbidden);
                }
                self.data_dir.clone()
            }
        };

        debug!(%fingerprint, session = issued_token.is_none(), "Authenticated");
        Ok(AuthorizedContext {
            key,
            salt,
            fingerprint,
            namespace,
            issued_token,
        })
    }
}

/// Pull credentials out of the request headers
pub fn credentials_from_headers(headers: &HeaderMap) -> Result<Credentials, AuthError> {
    let basic = headers
        .typed_get::<Authorization<Basic>>()
        .ok_or(AuthError::Unauthorized)?;
    let mut credentials = Credentials::new(basic.username(), basic.password());

    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE).filter(|c| !c.value().is_empty()) {
        credentials = credentials.with_token(cookie.value());
    }
    Ok(credentials)
}

/// Authenticate a request on the blocking pool
pub async fn authorize(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<AuthorizedContext, ApiError> {
    let credentials = credentials_from_headers(headers)?;
    let state = Arc::clone(state);
    let context = tokio::task::spawn_blocking(move || state.authenticator.authenticate(&credentials))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(context)
}

/// Cookie carrying a freshly issued session token
pub fn session_cookie(token: &SessionToken, lifetime: Duration) -> Cookie<'static> {
    let expires = OffsetDateTime::now_utc() + lifetime;
    Cookie::build((SESSION_COOKIE, token.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .expires(expires)
        .build()
}

/// Cookie that clears any session token the client holds
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Allowlist;
    use axum::http::header;
    use base64::Engine as _;

    const PASSWORD: &str = "correcthorsebatterystaple";

    fn cheap_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn config(registration: Registration) -> GatewayConfig {
        GatewayConfig {
            data_dir: PathBuf::from("/srv/www"),
            registration,
            kdf_params: cheap_params(),
            ..Default::default()
        }
    }

    fn open() -> Authenticator {
        Authenticator::new(&config(Registration::Open))
    }

    #[test]
    fn test_password_login_issues_token() {
        let auth = open();
        let ctx = auth.authenticate(&Credentials::new("alice", PASSWORD)).unwrap();

        let token = ctx.issued_token.as_ref().unwrap();
        assert_eq!(ContentKey::from_token(token.as_str()).unwrap(), ctx.key);
        assert_eq!(
            ctx.namespace,
            PathBuf::from("/srv/www").join(ctx.fingerprint.to_encoded())
        );
    }

    #[test]
    fn test_token_login_matches_password_login() {
        let auth = open();
        let first = auth.authenticate(&Credentials::new("alice", PASSWORD)).unwrap();
        let token = first.issued_token.as_ref().unwrap().as_str().to_string();

        let second = auth
            .authenticate(&Credentials::new("alice", "").with_token(token))
            .unwrap();
        assert!(second.issued_token.is_none());
        assert_eq!(second.key, first.key);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(
            second.storage_path("/notes.txt"),
            first.storage_path("/notes.txt")
        );
    }

    #[test]
    fn test_token_bound_to_username() {
        let auth = open();
        let alice = auth.authenticate(&Credentials::new("alice", PASSWORD)).unwrap();
        let token = alice.issued_token.as_ref().unwrap().as_str().to_string();

        let mallory = auth
            .authenticate(&Credentials::new("mallory", "").with_token(token))
            .unwrap();
        assert_ne!(mallory.fingerprint, alice.fingerprint);
        assert_ne!(
            mallory.storage_path("/notes.txt"),
            alice.storage_path("/notes.txt")
        );
    }

    #[test]
    fn test_format_errors() {
        let auth = open();
        assert!(matches!(
            auth.authenticate(&Credentials::new("", PASSWORD)),
            Err(AuthError::Format)
        ));
        assert!(matches!(
            auth.authenticate(&Credentials::new("alice", "short")),
            Err(AuthError::Format)
        ));
        // length counts characters, not bytes
        assert!(matches!(
            auth.authenticate(&Credentials::new("alice", "ééééééééééééééé")),
            Err(AuthError::Format)
        ));
        assert!(auth
            .authenticate(&Credentials::new("alice", "éééééééééééééééé"))
            .is_ok());
    }

    #[test]
    fn test_bad_token() {
        let auth = open();
        for token in ["not base64!", "dG9vc2hvcnQ", &"A".repeat(44)] {
            assert!(matches!(
                auth.authenticate(&Credentials::new("alice", "").with_token(token)),
                Err(AuthError::TokenFormat)
            ));
        }
    }

    #[test_log::test]
    fn test_closed_registration() {
        let mut cfg = config(Registration::Closed(Allowlist::default()));
        assert!(matches!(
            Authenticator::new(&cfg).authenticate(&Credentials::new("alice", PASSWORD)),
            Err(AuthError::Forbidden)
        ));

        // same root secret, so the fingerprint carries over
        let fingerprint = Authenticator::new(&GatewayConfig {
            registration: Registration::Open,
            ..cfg.clone()
        })
        .authenticate(&Credentials::new("alice", PASSWORD))
        .unwrap()
        .fingerprint;

        cfg.registration = Registration::Closed([fingerprint].into_iter().collect());
        let allowed = Authenticator::new(&cfg)
            .authenticate(&Credentials::new("alice", PASSWORD))
            .unwrap();
        assert_eq!(allowed.fingerprint, fingerprint);
        assert_eq!(allowed.namespace, PathBuf::from("/srv/www"));
    }

    fn basic(user: &str, pass: &str) -> String {
        let raw = format!("{user}:{pass}");
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            credentials_from_headers(&headers),
            Err(AuthError::Unauthorized)
        ));

        headers.insert(header::AUTHORIZATION, basic("alice", PASSWORD).parse().unwrap());
        let creds = credentials_from_headers(&headers).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, PASSWORD);
        assert!(creds.token.is_none());

        headers.insert(header::COOKIE, "other=1; crydrv=abc".parse().unwrap());
        let creds = credentials_from_headers(&headers).unwrap();
        assert_eq!(creds.token.as_deref(), Some("abc"));

        headers.insert(header::COOKIE, "crydrv=".parse().unwrap());
        assert!(credentials_from_headers(&headers).unwrap().token.is_none());
    }

    #[test]
    fn test_cookie_attributes() {
        let token = ContentKey::from_bytes(&[1u8; 32]).unwrap().to_token();
        let cookie = session_cookie(&token, Duration::from_secs(3600)).to_string();
        assert!(cookie.starts_with(&format!("crydrv={}", token.as_str())));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Expires="));

        let removal = removal_cookie().to_string();
        assert!(removal.starts_with("crydrv=;"));
        assert!(removal.contains("1970"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("alice", PASSWORD).with_token("secret-token");
        let shown = format!("{creds:?}");
        assert!(!shown.contains(PASSWORD));
        assert!(!shown.contains("secret-token"));
    }
}
