//! Ingest Service for the Laptimes Tracker
//!
//! Receives put notifications for uploaded race files, flattens each file into
//! lap records, stores them and relocates the processed file.
//!
//! # Architecture
//!
//! ```text
//! Bucket put -> /events -> IngestProcessor -> Record Store
//!                               |
//!                               +-> <base>-completed.json
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/ingest, /etc/laptimes/ingest)
//! 2. Environment variables (prefixed with INGEST__)

mod config;
mod server;

use anyhow::{Context, Result};
use config::IngestConfig;
use laptimes_pipeline::{IngestProcessor, LoggingConfig, PgRecordStore, S3BlobStore};
use server::{start_server, AppState};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = IngestConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        bucket = %config.s3.bucket,
        "Starting laptimes ingest service"
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

    let processor = IngestProcessor::new(
        Arc::new(blob_store),
        Arc::new(record_store),
        config.processor_options(),
    );

    let state = AppState {
        processor: Arc::new(processor),
    };

    let addr = config.listen_addr();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(state, &addr).await {
            error!(error = %e, "Notification listener error");
        }
    });

    info!("Ingest service started successfully");

    shutdown_signal().await;

    info!("Shutting down ingest service");
    server_handle.abort();

    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> Result<()> {
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

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
