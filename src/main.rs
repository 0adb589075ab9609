//! # Coach Portal Main Entry Point
//!
//! This is the main entry point for the coach portal service.

use coach_portal::{config::ConfigLoader, db, server::run_server, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let pool = db::init_pool(&config).await?;

    // Start the server with the loaded configuration
    run_server(config, pool).await
}
