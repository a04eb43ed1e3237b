//! API service configuration, loaded from `config/api`, `/etc/laptimes/api`
//! and `API__`-prefixed environment variables.

use anyhow::Context;
use axum::http::HeaderValue;
use laptimes_pipeline::{ConfigError, DatabaseConfig, LoggingConfig, S3Config};
use serde::Deserialize;

/// Main configuration for the API service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP configuration
    pub api: ApiConfig,
    /// Bucket uploads are written to
    pub s3: S3Config,
    /// Record store
    pub database: DatabaseConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Origin of the dashboard site, echoed in Access-Control-Allow-Origin
    pub site_origin: String,
    /// Prefix prepended to uploaded object keys
    #[serde(default)]
    pub upload_prefix: String,
}

fn default_service_name() -> String {
    "laptimes-api".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl ApiConfig {
    /// Site origin as a header value
    pub fn origin_header(&self) -> Result<HeaderValue, ConfigError> {
        HeaderValue::from_str(self.site_origin.trim()).map_err(|e| ConfigError::InvalidValue {
            key: "api.site_origin".to_string(),
            message: e.to_string(),
        })
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/api").required(false))
            .add_source(config::File::with_name("/etc/laptimes/api").required(false))
            // API__API__SITE_ORIGIN -> api.site_origin
            .add_source(
                config::Environment::with_prefix("API")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read API configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.site_origin.trim().is_empty() {
            return Err(ConfigError::MissingRequired("api.site_origin".to_string()).into());
        }
        self.api.origin_header()?;
        self.s3.validate()?;
        self.database.validate()?;
        Ok(())
    }
}
