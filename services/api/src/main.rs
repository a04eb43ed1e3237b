//! Laptimes API service binary

use anyhow::{Context, Result};
use laptimes_api::{start_api_server, AppState, Config};
use laptimes_pipeline::{LoggingConfig, PgRecordStore, S3BlobStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        site_origin = %config.api.site_origin,
        "Starting laptimes API service"
    );

    init_metrics(config.service.metrics_port)?;

    let record_store = PgRecordStore::new(&config.database)
        .await
        .context("Failed to initialize record store")?;
    if config.database.create_table {
        record_store
            .ensure_table()
            .await
            .context("Failed to prepare record table")?;
    }

    let blob_store = S3BlobStore::new(&config.s3)
        .await
        .context("Failed to initialize blob store")?;

    let state = AppState {
        record_store: Arc::new(record_store),
        blob_store: Arc::new(blob_store),
        upload_prefix: config.api.upload_prefix.clone(),
    };

    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    shutdown_signal().await;

    info!("Shutting down laptimes API service");
    api_handle.abort();

    Ok(())
}

fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
