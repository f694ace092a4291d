use std::sync::Arc;

use tracing::{error, info};

use warden::{clock, AuthService, Config, Database, SigningKeys};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = warden::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        warden::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "warden stopped with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> warden::Result<()> {
    config.validate()?;

    let db = Database::open(&config.database.path).await?;
    let keys = SigningKeys::load_or_generate(&config.token.signing_key_path)?;
    let auth = AuthService::new(&config, Arc::new(db.store()), keys, clock::system())?;
    let sweepers = auth.start_sweepers();

    info!(
        token_ttl_secs = config.token.ttl_secs,
        reset_window_secs = config.reset.window_secs,
        "warden ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    sweepers.shutdown().await;
    db.pool().close().await;
    Ok(())
}
