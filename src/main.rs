//! Prediction-Market Listener — Entry Point
//!
//! Gap-free limit-order-book snapshot capture across Polymarket and
//! Kalshi: discovers markets per listener config, streams venue feeds,
//! normalizes into a common snapshot/trade shape with forward-fill, and
//! writes batched records through a pluggable sink.

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use adapters::config_store::FileConfigStore;
use adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use adapters::sink::{BatchingSink, JsonlWriter};
use ports::sink::Sink as _;
use usecases::ListenerManager;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("LOB_LISTENER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let app_config = config::loader::load_config(&config_path).context("failed to load configuration")?;

    init_logging(&app_config.logging);

    info!(version = VERSION, pid = std::process::id(), "starting prediction-market listener");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let metrics = Arc::new(MetricsRegistry::new().context("failed to build metrics registry")?);

    let writer = JsonlWriter::new(app_config.sink.data_dir.clone());
    let sink = Arc::new(BatchingSink::new(
            writer,
            app_config.sink.max_retries,
            app_config.sink.retry_base_delay_ms,
            metrics.clone(),
        ));

    let health = HealthState::new();
    let config_store = Arc::new(FileConfigStore::new(app_config.config_store.path.clone()));

    let mut tasks = Vec::new();

    if app_config.metrics.enabled {
        let metrics_for_server = metrics.clone();
        let bind_address = app_config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
                    if let Err(e) = metrics_for_server.serve(bind_address, metrics_shutdown).await {
                        error!(error = %e, "metrics server exited with error");
                    }
                }));

        let health_server = HealthServer::new(health.clone(), app_config.metrics.health_port);
        let health_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
                    if let Err(e) = health_server.run(health_shutdown).await {
                        error!(error = %e, "health server exited with error");
                    }
                }));
    }

    let manager = ListenerManager::new(
        config_store,
        sink.clone(),
        health,
        metrics,
        app_config.polymarket.clone(),
        app_config.kalshi.clone(),
        app_config.manager.reload_interval_s,
        app_config.manager.shutdown_deadline_s,
    );
    let manager_shutdown = shutdown_tx.subscribe();
    let manager_task = tokio::spawn(manager.run(manager_shutdown));

    wait_for_termination().await;
    info!("shutdown signal received, stopping listener fleet");

    let _ = shutdown_tx.send(());
    if let Err(e) = manager_task.await {
        error!(error = %e, "listener manager task panicked during shutdown");
    }
    if let Err(e) = sink.flush().await {
        error!(error = %e, "final sink flush failed");
    }

    for task in tasks {
        task.abort();
    }

    info!(version = VERSION, "shutdown complete");
    Ok(())
}

fn init_logging(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = signal::ctrl_c().await;
}
