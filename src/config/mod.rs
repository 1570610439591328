//! Application configuration.
//!
//! Aggregates messaging and storage configuration into a single Config
//! struct loaded from YAML files and environment variables.

use serde::Deserialize;

use crate::bus::MessagingConfig;
use crate::storage::StorageConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ORDERFLOW_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ORDERFLOW";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ORDERFLOW_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `ORDERFLOW_CONFIG` environment variable (if set)
    /// 4. Environment variables with `ORDERFLOW` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PublisherMode;
    use crate::storage::StorageKind;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.messaging.host, "localhost");
        assert_eq!(config.messaging.port, 5672);
        assert_eq!(config.messaging.publisher, PublisherMode::Amqp);
        assert_eq!(config.storage.kind, StorageKind::Memory);
    }

    #[test]
    fn test_config_for_test() {
        let config = Config::for_test();
        assert_eq!(config.messaging.connect_attempts, 10);
    }
}
