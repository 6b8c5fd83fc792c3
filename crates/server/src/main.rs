mod bootstrap;
mod health;
mod messages;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mailrelay_core::config::{AppConfig, LoadOptions};
use mailrelay_core::pending::spawn_eviction;

use crate::messages::{InFlight, MessagesState};

fn init_logging(config: &AppConfig) {
    use mailrelay_core::config::LogFormat::*;
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

    let eviction = spawn_eviction(
        app.pending.clone(),
        Duration::from_secs(app.config.pending.ttl_secs),
        Duration::from_secs(app.config.pending.eviction_interval_secs),
    );

    let in_flight = Arc::new(InFlight::default());
    let routes = messages::router(MessagesState::new(
        app.relay.clone(),
        Arc::new(app.connector.clone()),
        in_flight.clone(),
    ))
    .merge(health::router(app.pending.clone(), app.config.foundry.agent_name.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        agent_name = %app.config.foundry.agent_name,
        "mailrelay-server listening"
    );

    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        in_flight = in_flight.running(),
        "mailrelay-server stopping"
    );
    let abandoned = in_flight
        .drain(Duration::from_secs(app.config.server.graceful_shutdown_secs))
        .await;
    eviction.abort();
    let cleared = app.pending.clear().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        abandoned_handlers = abandoned,
        cleared_pending = cleared,
        "mailrelay-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
