//! Configuration sections shared by the laptimes services.
//!
//! Each service composes these into its own top-level config and loads it
//! with the `config` crate (files first, then prefixed environment variables).

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Object storage holding uploaded race files
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket uploads are written to and read from
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Record store connection
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Table lap records are written to
    #[serde(default = "default_table")]
    pub table: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Create the record table on startup if it does not exist
    #[serde(default = "default_true")]
    pub create_table: bool,
    /// Records per insert statement
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

/// Logging output
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_table() -> String {
    "lap_records".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_write_batch_size() -> usize {
    25
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl S3Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingRequired("s3.bucket".to_string()));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("database.url".to_string()));
        }
        if self.write_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.write_batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !self
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidValue {
                key: "database.table".to_string(),
                message: "only letters, digits and underscores are allowed".to_string(),
            });
        }
        Ok(())
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database() -> DatabaseConfig {
        DatabaseConfig {
            url: "postgres://localhost/laptimes".to_string(),
            table: default_table(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            create_table: true,
            write_batch_size: default_write_batch_size(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_table(), "lap_records");
        assert_eq!(default_write_batch_size(), 25);
        assert_eq!(LoggingConfig::default().format, "json");
    }

    #[test]
    fn test_database_validation() {
        assert!(database().validate().is_ok());

        let mut config = database();
        config.write_batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = database();
        config.table = "laps; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        let mut config = database();
        config.url = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_s3_validation() {
        let config = S3Config {
            bucket: " ".to_string(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        };
        assert!(config.validate().is_err());
    }
}
