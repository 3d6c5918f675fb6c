//! Application state

use crate::auth::Authenticator;
use crate::config::{GatewayConfig, Registration};
use crydrv_store::{create_private_dir, BlobStore};
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Credential checking and key derivation
    pub authenticator: Authenticator,
    /// Locked access to encrypted blobs
    pub store: BlobStore,
}

impl AppState {
    /// Validate the configuration and prepare the data directory
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        config.validate()?;
        create_private_dir(&config.data_dir)?;

        match &config.registration {
            Registration::Open => {
                info!("Open registration enabled: every username/password combination can log in")
            }
            Registration::Closed(allowlist) if allowlist.is_empty() => {
                warn!("Registration closed and USERS_ALLOWLIST is empty: nobody can log in")
            }
            Registration::Closed(allowlist) => {
                info!(users = allowlist.len(), "Registration closed, allowlist loaded")
            }
        }
        info!(
            data_dir = %config.data_dir.display(),
            min_password_length = config.min_password_length,
            block_size = config.blob_format.block_size(),
            "Storage ready"
        );

        Ok(Self {
            authenticator: Authenticator::new(&config),
            store: BlobStore::new(config.blob_format),
            config,
        })
    }
}
