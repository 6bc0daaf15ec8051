//! MCHost Panel API - Entry Point

use mchost_panel::{ApiServer, AppState, Config, Defaults, Keys, PanelClient, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("MCHost Panel API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let defaults = Defaults::load(&config.defaults_path)?;

    let db_path = std::env::var("MCHOST_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("mchost.db"));
    let store = Store::open(&db_path)?;

    let panel = Arc::new(PanelClient::new(&config, defaults.server_config.clone()));
    let auth = Keys::new(&config.jwt_secret, config.token_ttl_minutes);

    let state = Arc::new(AppState {
        store,
        panel,
        auth,
        defaults,
    });

    ApiServer::new(config, state).run().await
}
