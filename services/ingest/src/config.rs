//! Configuration management for the ingest service.
//!
//! Configuration is loaded from optional files and then environment
//! variables prefixed with `INGEST` (e.g. `INGEST__S3__BUCKET`).

use anyhow::Context;
use config::{Config, Environment, File};
use laptimes_pipeline::{DatabaseConfig, LoggingConfig, ProcessorOptions, S3Config};
use serde::Deserialize;

/// Main configuration for the ingest service.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Notification listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Bucket holding uploads
    pub s3: S3Config,

    /// Record store
    pub database: DatabaseConfig,

    /// Processing behaviour
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Address the put-notification webhook listens on
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessingConfig {
    /// Accept the deprecated `<track>-<notes>.json` naming when a document has no track name
    #[serde(default)]
    pub allow_legacy_filename_track: bool,
}

fn default_service_name() -> String {
    "laptimes-ingest".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/ingest").required(false))
            .add_source(File::with_name("/etc/laptimes/ingest").required(false))
            // INGEST__DATABASE__URL -> database.url
            .add_source(
                Environment::with_prefix("INGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read ingest configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize ingest configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.s3.validate()?;
        self.database.validate()?;
        Ok(())
    }

    /// Processor options; notifications are accepted for the configured bucket only
    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            allow_legacy_filename_track: self.processing.allow_legacy_filename_track,
            bucket: Some(self.s3.bucket.clone()),
        }
    }

    /// Listen address for the notification webhook
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
