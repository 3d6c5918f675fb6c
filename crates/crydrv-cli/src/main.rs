//! crydrv server - encrypted personal file store over HTTP

use clap::Parser;
use crydrv_cli::config::{parse_secret_key, Allowlist, Registration};
use crydrv_cli::{run_server_with_shutdown, GatewayConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "crydrv-server")]
#[command(about = "Encrypted file store: every user's files are sealed with a key derived from their password")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "CRYDRV_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "CRYDRV_PORT")]
    port: u16,

    /// Directory holding the encrypted files
    #[arg(long, default_value = "./www", env = "CRYDRV_DATA_DIR")]
    data_dir: PathBuf,

    /// Server secret (32 bytes, unpadded base64url)
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Let any username/password combination log in
    #[arg(long, env = "OPEN_REGISTRATION")]
    open_registration: bool,

    /// Fingerprints allowed to log in when registration is closed
    #[arg(long, default_value = "", env = "USERS_ALLOWLIST")]
    users_allowlist: String,

    /// Minimum password length in characters
    #[arg(long, default_value = "16", env = "MIN_PASSWORD_LENGTH")]
    min_password_length: usize,

    /// Session cookie lifetime in seconds
    #[arg(long, default_value = "86400", env = "COOKIE_LIFETIME_SECS")]
    cookie_lifetime_secs: u64,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "5368709120", env = "CRYDRV_MAX_BODY_SIZE")]
    max_body_size: u64,

    /// Enable debug logging
    #[arg(short, long, env = "CRYDRV_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Parse arguments
    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("crydrv_cli={log_level},crydrv_store={log_level},tower_http={log_level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build configuration
    let registration = if args.open_registration {
        Registration::Open
    } else {
        Registration::Closed(Allowlist::parse(&args.users_allowlist)?)
    };
    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        data_dir: args.data_dir,
        root_secret: parse_secret_key(args.secret_key.as_deref())?,
        registration,
        min_password_length: args.min_password_length,
        cookie_lifetime: Duration::from_secs(args.cookie_lifetime_secs),
        max_body_size: args.max_body_size,
        ..Default::default()
    };

    tracing::info!("Starting crydrv on {}", config.bind_addr());

    // Run the server
    run_server_with_shutdown(config, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
}
