// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Configuration schema definitions for ribsink.
//!
//! ```text
//! SinkConfig
//! ├── base: BaseConfig          - engine and writer-fleet tuning
//! ├── postgres: PostgresConfig  - connection and batching
//! └── kafka: KafkaConfig        - bus client properties and topics
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default stats logging interval in seconds.
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 300;

/// Default number of consumer engines.
pub const DEFAULT_CONSUMER_THREADS: usize = 1;

/// Default collector heartbeat age alarm, in minutes.
pub const DEFAULT_HEARTBEAT_MAX_AGE_MIN: u64 = 15;

/// Default maximum writers per type.
pub const DEFAULT_WRITER_MAX_THREADS: usize = 3;

/// Default consecutive over-watermark samples tolerated.
pub const DEFAULT_WRITER_ALLOWED_OVER: u32 = 2;

/// Default writer scale-back quiet period in seconds.
pub const DEFAULT_WRITER_SCALE_BACK_SECS: u64 = 1800;

/// Default writer rebalance interval in seconds.
pub const DEFAULT_WRITER_REBALANCE_SECS: u64 = 300;

/// Default per-writer queue capacity.
pub const DEFAULT_WRITER_QUEUE_SIZE: usize = 20_000;

/// Default intake queue capacity.
pub const DEFAULT_CONSUMER_QUEUE_SIZE: usize = 10_000;

/// Default base-attribute dedup age in milliseconds.
pub const DEFAULT_ATTR_CACHE_AGE_MILLIS: i64 = 1_200_000;

/// Default writer drain deadline in seconds.
pub const DEFAULT_WRITER_DRAIN_DEADLINE_SECS: u64 = 30;

/// Default batch record cap.
pub const DEFAULT_BATCH_RECORDS: usize = 3000;

/// Default batch hold time in milliseconds.
pub const DEFAULT_BATCH_TIME_MILLIS: u64 = 300;

/// Default statement retry budget.
pub const DEFAULT_DB_RETRIES: u32 = 10;

/// Default delay between topic subscription steps, in milliseconds.
pub const DEFAULT_TOPIC_SUBSCRIBE_DELAY_MILLIS: u64 = 10_000;

/// Default subscription TTL in seconds.
pub const DEFAULT_SUBSCRIPTION_TIMEOUT_SECS: u64 = 3600;

/// Consumer properties the bus client cannot run without.
const REQUIRED_CONSUMER_PROPS: [&str; 6] = [
    "group.id",
    "client.id",
    "bootstrap.servers",
    "auto.offset.reset",
    "max.poll.records",
    "session.timeout.ms",
];

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for ribsink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Engine and writer tuning.
    #[serde(default)]
    pub base: BaseConfig,

    /// Database connection and batching.
    pub postgres: PostgresConfig,

    /// Bus client configuration.
    pub kafka: KafkaConfig,
}

impl SinkConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.base.validate()?;
        self.postgres.validate()?;
        self.kafka.validate()?;
        Ok(())
    }

    /// Creates a configuration for tests.
    pub fn for_testing() -> Self {
        let consumer_config = REQUIRED_CONSUMER_PROPS
            .iter()
            .map(|k| (k.to_string(), test_prop_value(k)))
            .collect();

        Self {
            base: BaseConfig::default(),
            postgres: PostgresConfig {
                host: "127.0.0.1".into(),
                db_name: "bgpdata_test".into(),
                username: "ribsink".into(),
                password: "ribsink".into(),
                ssl_enable: false,
                ssl_mode: default_ssl_mode(),
                batch_records: 10,
                batch_time_millis: 20,
                retries: 1,
            },
            kafka: KafkaConfig {
                consumer_config,
                producer_config: HashMap::from([(
                    "bootstrap.servers".to_string(),
                    "127.0.0.1:9092".to_string(),
                )]),
                topic_subscribe_delay_millis: 10,
                subscription_timeout_seconds: 60,
                subscribe_topic_patterns: default_topic_patterns(),
            },
        }
    }
}

fn test_prop_value(key: &str) -> String {
    match key {
        "group.id" => "ribsink-test".into(),
        "client.id" => "ribsink-test-1".into(),
        "bootstrap.servers" => "127.0.0.1:9092".into(),
        "auto.offset.reset" => "earliest".into(),
        "max.poll.records" => "500".into(),
        "session.timeout.ms" => "30000".into(),
        _ => String::new(),
    }
}

// =============================================================================
// Base Configuration
// =============================================================================

/// Engine and writer-fleet tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Stats logging interval in seconds.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,

    /// Number of independent consumer engines. Partitions balance
    /// across them through the consumer group.
    #[serde(default = "default_consumer_threads")]
    pub consumer_threads: usize,

    /// Alarm threshold for collector heartbeat age, in minutes.
    #[serde(default = "default_heartbeat_max_age")]
    pub heartbeat_max_age: u64,

    /// Maximum writers per writer type.
    #[serde(default = "default_writer_max_threads")]
    pub writer_max_threads_per_type: usize,

    /// Consecutive over-watermark samples tolerated before scaling or
    /// rebalancing a writer.
    #[serde(default = "default_writer_allowed_over")]
    pub writer_allowed_over_queue_times: u32,

    /// Quiet period before removing a writer, in seconds.
    #[serde(default = "default_writer_scale_back")]
    pub writer_seconds_thread_scale_back: u64,

    /// Interval between writer rebalance passes, in seconds.
    #[serde(default = "default_writer_rebalance")]
    pub writer_rebalance_seconds: u64,

    /// Per-writer queue capacity.
    #[serde(default = "default_writer_queue_size")]
    pub writer_queue_size: usize,

    /// Intake queue capacity.
    #[serde(default = "default_consumer_queue_size")]
    pub consumer_queue_size: usize,

    /// Base-attribute dedup entry age in milliseconds.
    #[serde(default = "default_attr_cache_age")]
    pub attr_cache_age_millis: i64,

    /// Deadline for draining one writer queue, in seconds.
    #[serde(default = "default_writer_drain_deadline")]
    pub writer_drain_deadline_seconds: u64,
}

fn default_stats_interval() -> u64 {
    DEFAULT_STATS_INTERVAL_SECS
}

fn default_consumer_threads() -> usize {
    DEFAULT_CONSUMER_THREADS
}

fn default_heartbeat_max_age() -> u64 {
    DEFAULT_HEARTBEAT_MAX_AGE_MIN
}

fn default_writer_max_threads() -> usize {
    DEFAULT_WRITER_MAX_THREADS
}

fn default_writer_allowed_over() -> u32 {
    DEFAULT_WRITER_ALLOWED_OVER
}

fn default_writer_scale_back() -> u64 {
    DEFAULT_WRITER_SCALE_BACK_SECS
}

fn default_writer_rebalance() -> u64 {
    DEFAULT_WRITER_REBALANCE_SECS
}

fn default_writer_queue_size() -> usize {
    DEFAULT_WRITER_QUEUE_SIZE
}

fn default_consumer_queue_size() -> usize {
    DEFAULT_CONSUMER_QUEUE_SIZE
}

fn default_attr_cache_age() -> i64 {
    DEFAULT_ATTR_CACHE_AGE_MILLIS
}

fn default_writer_drain_deadline() -> u64 {
    DEFAULT_WRITER_DRAIN_DEADLINE_SECS
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            stats_interval: default_stats_interval(),
            consumer_threads: default_consumer_threads(),
            heartbeat_max_age: default_heartbeat_max_age(),
            writer_max_threads_per_type: default_writer_max_threads(),
            writer_allowed_over_queue_times: default_writer_allowed_over(),
            writer_seconds_thread_scale_back: default_writer_scale_back(),
            writer_rebalance_seconds: default_writer_rebalance(),
            writer_queue_size: default_writer_queue_size(),
            consumer_queue_size: default_consumer_queue_size(),
            attr_cache_age_millis: default_attr_cache_age(),
            writer_drain_deadline_seconds: default_writer_drain_deadline(),
        }
    }
}

impl BaseConfig {
    /// Validates this section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consumer_threads < 1 {
            return Err(ConfigError::validation(
                "base.consumer_threads",
                "must be at least 1",
            ));
        }
        if self.writer_max_threads_per_type < 1 {
            return Err(ConfigError::validation(
                "base.writer_max_threads_per_type",
                "must be at least 1",
            ));
        }
        if self.writer_queue_size == 0 {
            return Err(ConfigError::validation(
                "base.writer_queue_size",
                "must be positive",
            ));
        }
        if self.consumer_queue_size == 0 {
            return Err(ConfigError::validation(
                "base.consumer_queue_size",
                "must be positive",
            ));
        }
        if self.attr_cache_age_millis <= 0 {
            return Err(ConfigError::validation(
                "base.attr_cache_age_millis",
                "must be positive",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Postgres Configuration
// =============================================================================

/// Database connection and batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// Server host, optionally `host:port`.
    pub host: String,

    /// Database name.
    pub db_name: String,

    /// Login role.
    pub username: String,

    /// Login password.
    pub password: String,

    /// Whether to request SSL.
    #[serde(default)]
    pub ssl_enable: bool,

    /// Requested `sslmode` when SSL is enabled.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Maximum records merged into one bulk statement.
    #[serde(default = "default_batch_records")]
    pub batch_records: usize,

    /// Maximum time a batch is held open, in milliseconds.
    #[serde(default = "default_batch_time")]
    pub batch_time_millis: u64,

    /// Statement retry budget for transient failures.
    #[serde(default = "default_db_retries")]
    pub retries: u32,
}

fn default_ssl_mode() -> String {
    "require".to_string()
}

fn default_batch_records() -> usize {
    DEFAULT_BATCH_RECORDS
}

fn default_batch_time() -> u64 {
    DEFAULT_BATCH_TIME_MILLIS
}

fn default_db_retries() -> u32 {
    DEFAULT_DB_RETRIES
}

impl PostgresConfig {
    /// Validates this section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::missing_field("postgres.host"));
        }
        if self.db_name.is_empty() {
            return Err(ConfigError::missing_field("postgres.db_name"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::missing_field("postgres.username"));
        }
        if self.batch_records == 0 {
            return Err(ConfigError::validation(
                "postgres.batch_records",
                "must be positive",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Kafka Configuration
// =============================================================================

/// Bus client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaConfig {
    /// Opaque consumer properties handed to the bus client.
    #[serde(deserialize_with = "string_map")]
    pub consumer_config: HashMap<String, String>,

    /// Opaque producer properties for the notification topic.
    #[serde(default, deserialize_with = "string_map")]
    pub producer_config: HashMap<String, String>,

    /// Delay between topic subscription steps, in milliseconds.
    #[serde(default = "default_subscribe_delay")]
    pub topic_subscribe_delay_millis: u64,

    /// Subscription TTL in seconds.
    #[serde(default = "default_subscription_timeout")]
    pub subscription_timeout_seconds: u64,

    /// Topic patterns in subscription order: inventory topics first so
    /// routers and peers exist before prefixes referencing them.
    #[serde(default = "default_topic_patterns")]
    pub subscribe_topic_patterns: Vec<String>,
}

fn default_subscribe_delay() -> u64 {
    DEFAULT_TOPIC_SUBSCRIBE_DELAY_MILLIS
}

fn default_subscription_timeout() -> u64 {
    DEFAULT_SUBSCRIPTION_TIMEOUT_SECS
}

/// Default topic patterns, inventory first.
pub fn default_topic_patterns() -> Vec<String> {
    vec![
        r"bgpdata\.parsed\.collector".to_string(),
        r"bgpdata\.parsed\.router".to_string(),
        r"bgpdata\.parsed\.peer".to_string(),
        r"bgpdata\.parsed\.(base_attribute|bmp_stat|subscription)".to_string(),
        r"bgpdata\.parsed\.(unicast_prefix|l3vpn)".to_string(),
        r"bgpdata\.parsed\.ls_(node|link|prefix)".to_string(),
    ]
}

impl KafkaConfig {
    /// Validates this section.
    pub fn validate(&self) -> ConfigResult<()> {
        for key in REQUIRED_CONSUMER_PROPS {
            if !self.consumer_config.contains_key(key) {
                return Err(ConfigError::missing_field(format!(
                    "kafka.consumer_config.{key}"
                )));
            }
        }

        if self.subscribe_topic_patterns.is_empty() {
            return Err(ConfigError::validation(
                "kafka.subscribe_topic_patterns",
                "at least one pattern is required",
            ));
        }

        Ok(())
    }
}

/// Deserializes a map whose values may be YAML scalars of any type
/// (`session.timeout.ms: 30000`) into string values, the form the bus
/// client expects.
fn string_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<String, serde_yaml::Value> = HashMap::deserialize(deserializer)?;

    raw.into_iter()
        .map(|(k, v)| {
            let s = match v {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "property '{k}' must be a scalar, got {other:?}"
                    )))
                }
            };
            Ok((k, s))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_validates() {
        SinkConfig::for_testing().validate().unwrap();
    }

    #[test]
    fn test_missing_consumer_prop_rejected() {
        let mut config = SinkConfig::for_testing();
        config.kafka.consumer_config.remove("group.id");

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("group.id"));
    }

    #[test]
    fn test_zero_consumer_threads_rejected() {
        let mut config = SinkConfig::for_testing();
        config.base.consumer_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_numeric_properties_stringified() {
        let yaml = r#"
consumer_config:
  group.id: g
  client.id: c
  bootstrap.servers: localhost:9092
  auto.offset.reset: earliest
  max.poll.records: 500
  session.timeout.ms: 30000
"#;
        let kafka: KafkaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(kafka.consumer_config["session.timeout.ms"], "30000");
        assert_eq!(kafka.consumer_config["max.poll.records"], "500");
        kafka.validate().unwrap();
    }

    #[test]
    fn test_default_patterns_order_inventory_first() {
        let patterns = default_topic_patterns();
        assert!(patterns[0].contains("collector"));
        assert!(patterns[1].contains("router"));
        assert!(patterns[2].contains("peer"));
        assert!(patterns.last().unwrap().contains("ls_"));
    }

    #[test]
    fn test_empty_patterns_rejected() {
        let mut config = SinkConfig::for_testing();
        config.kafka.subscribe_topic_patterns.clear();
        assert!(config.validate().is_err());
    }
}
