mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use artibot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use artibot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "artibot-server listening");

    let router = api::router(app.runtime.clone()).merge(health::router(app.db_pool.clone()));

    let grace_secs = app.config.server.graceful_shutdown_secs;
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!("shutdown signal received, draining connections");
    let _ = drain_tx.send(());

    match tokio::time::timeout(Duration::from_secs(grace_secs), server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(grace_secs, "drain deadline reached, aborting open connections");
        }
    }

    app.db_pool.close().await;
    tracing::info!("artibot-server stopped");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
