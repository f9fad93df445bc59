//! order-server binary

use std::time::Duration;

use order_server::config::Config;
use order_server::idempotency::IdempotencyGate;
use order_server::state::AppState;
use order_server::{BoxError, api, logger};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    logger::init_logger_with_file(
        config.log_level.as_deref(),
        config.log_json,
        config.log_dir.as_deref(),
    );

    tracing::info!("Starting order-server (env: {})", config.environment);

    let state = AppState::new(&config).await?;

    spawn_idempotency_cleanup(
        state.idempotency.clone(),
        config.idempotency_cleanup_interval,
    );

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("order-server HTTP listening on {http_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("order-server stopped");
    Ok(())
}

/// Periodic sweep of expired idempotency records
fn spawn_idempotency_cleanup(gate: IdempotencyGate, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            gate.evict_expired().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
