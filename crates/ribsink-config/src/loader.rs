// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Configuration loading.
//!
//! Pipeline:
//!
//! 1. Read and parse the YAML file.
//! 2. Apply `POSTGRES_*` environment overrides.
//! 3. Validate.
//!
//! # Environment Overrides
//!
//! ```text
//! POSTGRES_HOST, POSTGRES_DB, POSTGRES_USER, POSTGRES_PASSWORD,
//! POSTGRES_SSL_ENABLE, POSTGRES_SSL_MODE
//! ```

use std::env;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::SinkConfig;

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for ribsink.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Whether to apply environment overrides.
    apply_env: bool,
}

impl ConfigLoader {
    /// Creates a loader with default settings.
    pub fn new() -> Self {
        Self { apply_env: true }
    }

    /// Enables or disables environment overrides.
    pub fn with_env_overrides(mut self, enabled: bool) -> Self {
        self.apply_env = enabled;
        self
    }

    /// Loads configuration from a YAML file.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<SinkConfig> {
        let path = path.as_ref();
        info!("loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

        let mut config: SinkConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::parse(path, e.to_string()))?;

        if self.apply_env {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;

        debug!(
            topics = config.kafka.subscribe_topic_patterns.len(),
            consumer_threads = config.base.consumer_threads,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(&self, content: &str) -> ConfigResult<SinkConfig> {
        let mut config: SinkConfig = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse("<inline>", e.to_string()))?;

        if self.apply_env {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies `POSTGRES_*` environment overrides.
    fn apply_env_overrides(&self, config: &mut SinkConfig) -> ConfigResult<()> {
        if let Ok(value) = env::var("POSTGRES_HOST") {
            config.postgres.host = value;
        }
        if let Ok(value) = env::var("POSTGRES_DB") {
            config.postgres.db_name = value;
        }
        if let Ok(value) = env::var("POSTGRES_USER") {
            config.postgres.username = value;
        }
        if let Ok(value) = env::var("POSTGRES_PASSWORD") {
            config.postgres.password = value;
        }
        if let Ok(value) = env::var("POSTGRES_SSL_ENABLE") {
            config.postgres.ssl_enable = parse_bool(&value).ok_or_else(|| {
                ConfigError::invalid_env_var("POSTGRES_SSL_ENABLE", "expected true/false")
            })?;
        }
        if let Ok(value) = env::var("POSTGRES_SSL_MODE") {
            config.postgres.ssl_mode = value;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a boolean-ish string.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Some(true),
        "false" | "0" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<SinkConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a YAML string with default settings.
pub fn load_config_str(content: &str) -> ConfigResult<SinkConfig> {
    ConfigLoader::new().load_from_str(content)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_yaml() -> &'static str {
        r#"
base:
  stats_interval: 60
  consumer_threads: 1

postgres:
  host: db.example.net
  db_name: bgpdata
  username: ribsink
  password: secret

kafka:
  consumer_config:
    group.id: ribsink
    client.id: ribsink-1
    bootstrap.servers: broker:9092
    auto.offset.reset: earliest
    max.poll.records: 500
    session.timeout.ms: 30000
  producer_config:
    bootstrap.servers: broker:9092
  topic_subscribe_delay_millis: 10000
  subscription_timeout_seconds: 3600
"#
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(test_yaml().as_bytes()).unwrap();

        let loader = ConfigLoader::new().with_env_overrides(false);
        let config = loader.load(file.path()).unwrap();

        assert_eq!(config.base.stats_interval, 60);
        assert_eq!(config.postgres.host, "db.example.net");
        assert_eq!(config.kafka.consumer_config["group.id"], "ribsink");
        // Unset sections fall back to defaults.
        assert!(!config.kafka.subscribe_topic_patterns.is_empty());
    }

    #[test]
    fn test_file_not_found() {
        let loader = ConfigLoader::new();
        let err = loader.load("/nonexistent/ribsink.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let loader = ConfigLoader::new().with_env_overrides(false);
        let err = loader.load_from_str("postgres: [not a map").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        // Env vars are process-global; run the override path directly.
        let loader = ConfigLoader::new();
        let mut config = loader
            .clone()
            .with_env_overrides(false)
            .load_from_str(test_yaml())
            .unwrap();

        env::set_var("POSTGRES_HOST", "override.example.net");
        env::set_var("POSTGRES_SSL_ENABLE", "true");
        loader.apply_env_overrides(&mut config).unwrap();
        env::remove_var("POSTGRES_HOST");
        env::remove_var("POSTGRES_SSL_ENABLE");

        assert_eq!(config.postgres.host, "override.example.net");
        assert!(config.postgres.ssl_enable);
    }

    #[test]
    fn test_bad_bool_env_rejected() {
        let loader = ConfigLoader::new();
        let mut config = loader
            .clone()
            .with_env_overrides(false)
            .load_from_str(test_yaml())
            .unwrap();

        env::set_var("POSTGRES_SSL_ENABLE", "maybe");
        let result = loader.apply_env_overrides(&mut config);
        env::remove_var("POSTGRES_SSL_ENABLE");

        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
