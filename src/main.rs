use anyhow::Context;
use std::net::SocketAddr;

use stk_checkout::{build_router, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        short_code = %config.mpesa.short_code,
        environment = config.mpesa.environment.as_str(),
        "Configuration loaded"
    );

    let app_state = AppState::from_config(&config)
        .await
        .context("Failed to initialize services")?;

    // Verify credentials up front; a failure here is logged, not fatal.
    match app_state.mpesa_service.get_access_token().await {
        Ok(_) => tracing::info!("M-Pesa access token obtained"),
        Err(e) => tracing::warn!(error = %e, "Could not obtain M-Pesa access token at startup"),
    }

    let app = build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;
    tracing::info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
