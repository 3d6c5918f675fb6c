//! # crydrv Server
//!
//! HTTP front end of the crydrv encrypted file store.
//!
//! This crate provides:
//! - **File API**: GET/HEAD/POST/PUT/DELETE on any path, with range requests
//! - **Authentication**: HTTP Basic credentials turned into a content key,
//!   cached client-side as a session cookie
//! - **Registration**: open self-service namespaces or an allowlist of
//!   fingerprints
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │             (browsers, curl, scripts)               │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                   crydrv server                     │
//! ├─────────────────────────────────────────────────────┤
//! │  Security Headers │ Request Logging │ Body Limit    │
//! ├─────────────────────────────────────────────────────┤
//! │      Authenticator (Argon2id / session token)       │
//! ├─────────────────────────────────────────────────────┤
//! │                  crydrv-store                       │
//! │      (locked block reader/writer on local disk)     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{AuthError, Authenticator, AuthorizedContext, Credentials};
pub use config::{ConfigError, GatewayConfig};
pub use error::{scrub_secrets, ApiError};
pub use server::{run_server, run_server_with_shutdown};
pub use state::AppState;
