// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # Configuration Integration Tests
//!
//! Full YAML round-trips through the loader, defaults, and validation
//! failures a deployment would actually hit.

use std::io::Write;

use tempfile::NamedTempFile;

use ribsink_config::{load_config, load_config_str, ConfigError};

fn full_yaml() -> &'static str {
    r#"
base:
  stats_interval: 120
  consumer_threads: 2
  heartbeat_max_age: 10
  writer_max_threads_per_type: 4
  writer_allowed_over_queue_times: 3
  writer_seconds_thread_scale_back: 900
  writer_rebalance_seconds: 180
  writer_queue_size: 50000
  consumer_queue_size: 20000

postgres:
  host: db.example.net:6432
  db_name: bgpdata
  username: ribsink
  password: secret
  ssl_enable: true
  ssl_mode: verify-full
  batch_records: 2000
  batch_time_millis: 250
  retries: 5

kafka:
  consumer_config:
    group.id: ribsink-prod
    client.id: ribsink-prod-1
    bootstrap.servers: broker-1:9092,broker-2:9092
    auto.offset.reset: earliest
    max.poll.records: 2000
    session.timeout.ms: 45000
  producer_config:
    bootstrap.servers: broker-1:9092,broker-2:9092
  topic_subscribe_delay_millis: 15000
  subscription_timeout_seconds: 7200
  subscribe_topic_patterns:
    - bgpdata\.parsed\.collector
    - bgpdata\.parsed\.router
    - bgpdata\.parsed\.peer
    - bgpdata\.parsed\.(base_attribute|bmp_stat|subscription)
    - bgpdata\.parsed\.(unicast_prefix|l3vpn)
    - bgpdata\.parsed\.ls_(node|link|prefix)
"#
}

#[test]
fn test_full_config_loads_from_file() {
    let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
    file.write_all(full_yaml().as_bytes()).unwrap();

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.base.consumer_threads, 2);
    assert_eq!(config.base.writer_queue_size, 50_000);
    assert_eq!(config.postgres.host, "db.example.net:6432");
    assert!(config.postgres.ssl_enable);
    assert_eq!(config.postgres.batch_records, 2000);
    assert_eq!(
        config.kafka.consumer_config["session.timeout.ms"],
        "45000"
    );
    assert_eq!(config.kafka.subscribe_topic_patterns.len(), 6);
}

#[test]
fn test_minimal_config_fills_defaults() {
    let yaml = r#"
postgres:
  host: localhost
  db_name: bgpdata
  username: ribsink
  password: secret

kafka:
  consumer_config:
    group.id: g
    client.id: c
    bootstrap.servers: localhost:9092
    auto.offset.reset: earliest
    max.poll.records: 500
    session.timeout.ms: 30000
"#;

    let config = load_config_str(yaml).unwrap();

    assert_eq!(config.base.consumer_threads, 1);
    assert_eq!(config.base.consumer_queue_size, 10_000);
    assert_eq!(config.base.attr_cache_age_millis, 1_200_000);
    assert_eq!(config.postgres.batch_records, 3000);
    assert_eq!(config.postgres.batch_time_millis, 300);
    assert_eq!(config.kafka.topic_subscribe_delay_millis, 10_000);
    // Default topic patterns subscribe inventory topics first.
    assert!(config.kafka.subscribe_topic_patterns[0].contains("collector"));
}

#[test]
fn test_missing_required_consumer_prop_fails() {
    let yaml = r#"
postgres:
  host: localhost
  db_name: bgpdata
  username: ribsink
  password: secret

kafka:
  consumer_config:
    group.id: g
    bootstrap.servers: localhost:9092
"#;

    let err = load_config_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::MissingField { .. }));
}

#[test]
fn test_unknown_key_rejected() {
    let yaml = r#"
postgres:
  host: localhost
  db_name: bgpdata
  username: ribsink
  password: secret
  pool_size: 10

kafka:
  consumer_config:
    group.id: g
    client.id: c
    bootstrap.servers: localhost:9092
    auto.offset.reset: earliest
    max.poll.records: 500
    session.timeout.ms: 30000
"#;

    let err = load_config_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
