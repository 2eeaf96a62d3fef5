//! slotswap server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use slotswap::api;
use slotswap::app_state::AppState;
use slotswap::config::AppConfig;
use slotswap::domain::EventBus;
use slotswap::ledger::{Ledger, MemoryLedger};
use slotswap::persistence::PostgresLedger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting slotswap");

    // Build ledger
    let ledger: Arc<dyn Ledger> = if config.persistence_enabled {
        let ledger = PostgresLedger::connect(&config).await?;
        ledger.migrate().await?;
        tracing::info!("using postgres ledger");
        Arc::new(ledger)
    } else {
        tracing::warn!("persistence disabled; state is kept in memory only");
        Arc::new(MemoryLedger::new())
    };

    // Build application state
    let event_bus = EventBus::new(config.event_bus_capacity);
    let app_state = AppState::new(ledger, event_bus);

    // Build router
    let app = api::build_app(app_state, config.request_timeout());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
