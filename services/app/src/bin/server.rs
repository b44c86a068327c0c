//! services/app/src/bin/server.rs

use app_lib::{
    adapters::AdminAuthAdapter,
    config::Config,
    error::AppError,
    web::{router, AppState},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting account service...");

    // --- 2. Initialize the Admin Adapter ---
    let admin = Arc::new(AdminAuthAdapter::new(
        config.auth_url.clone(),
        config.service_role_key()?,
    ));

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState { admin });

    // --- 4. Create the Web Router ---
    let app = router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
