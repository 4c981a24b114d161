//! Relay Gateway entry point
//!
//! Run with:
//! ```bash
//! UPSTREAM_ADDR=edi.example.net:8855 cargo run -p relay-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use relay_common::{
    try_init_tracing_with_config, Environment, RelayConfig, RelayError, TracingConfig,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Tracing preset depends on APP_ENV, so peek at it before full config load
    let _ = dotenvy::dotenv();
    let env: Environment = std::env::var("APP_ENV")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, code = e.error_code(), "Relay failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), RelayError> {
    info!("Starting Relay Gateway...");

    let config = RelayConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        env = ?config.app.env,
        listen = %config.listen.address(),
        path = %config.listen.path,
        upstream = %config.upstream.address,
        chunk_size = config.session.chunk_size,
        idle_timeout_secs = ?config.session.idle_timeout_secs,
        max_sessions = ?config.session.max_sessions,
        "Configuration loaded"
    );

    relay_gateway::run(config).await?;

    info!("Relay stopped");
    Ok(())
}
