// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Supervisor runtime.
//!
//! Construction order: database handles → subscription table and
//! sweeper → notification producer → writer pools → consumer engines.
//! Each engine runs on its own blocking thread (the bus client is
//! single-threaded by contract) with an independent writer fleet;
//! partitions balance across engines through the consumer group.
//!
//! On a shutdown signal the engines observe the shared flag, drain
//! their intake queues and writer fleets, and the supervisor collects
//! their exits. A statistics task logs per-engine counters every
//! `stats_interval` seconds and raises a warning when no collector
//! heartbeat has been seen within `heartbeat_max_age` minutes.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ribsink_config::{BaseConfig, KafkaConfig, PostgresConfig, SinkConfig};
use ribsink_consumer::{
    ConsumerEngine, DispatchConfig, Dispatcher, EngineConfig, EngineStats, KafkaNotifier,
    NotificationSink, NOTIFICATION_TOPIC,
};
use ribsink_core::retry::RetryConfig;
use ribsink_core::subscriptions::SubscriptionTable;
use ribsink_core::types::WriterType;
use ribsink_db::{Database, PgConnectConfig, PgHandle};
use ribsink_writer::{DbFactory, PoolConfig, WriterConfig, WriterPool};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

/// TCP connect timeout for database handles.
const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration Mapping
// =============================================================================

fn pg_connect_config(pg: &PostgresConfig) -> PgConnectConfig {
    PgConnectConfig {
        host: pg.host.clone(),
        db_name: pg.db_name.clone(),
        username: pg.username.clone(),
        password: pg.password.clone(),
        ssl_enable: pg.ssl_enable,
        ssl_mode: pg.ssl_mode.clone(),
        connect_timeout: DB_CONNECT_TIMEOUT,
    }
}

fn writer_config(base: &BaseConfig, pg: &PostgresConfig) -> WriterConfig {
    WriterConfig {
        queue_size: base.writer_queue_size,
        batch_records: pg.batch_records,
        batch_time: Duration::from_millis(pg.batch_time_millis),
        db_retries: pg.retries,
    }
}

fn pool_config(base: &BaseConfig, pg: &PostgresConfig) -> PoolConfig {
    PoolConfig {
        max_writers: base.writer_max_threads_per_type,
        allowed_over_queue_times: base.writer_allowed_over_queue_times,
        scale_back_after: Duration::from_secs(base.writer_seconds_thread_scale_back),
        rebalance_interval: Duration::from_secs(base.writer_rebalance_seconds),
        drain_deadline: Duration::from_secs(base.writer_drain_deadline_seconds),
        writer: writer_config(base, pg),
    }
}

fn dispatch_config(base: &BaseConfig, pg: &PostgresConfig, kafka: &KafkaConfig) -> DispatchConfig {
    DispatchConfig {
        intake_size: base.consumer_queue_size,
        db_retries: pg.retries,
        subscription_timeout_seconds: kafka.subscription_timeout_seconds,
        attr_cache_age_millis: base.attr_cache_age_millis,
    }
}

/// Builds the engine config for engine `index`, making `client.id`
/// unique when multiple engines share the group.
fn engine_config(kafka: &KafkaConfig, index: usize, engines: usize) -> EngineConfig {
    let mut consumer_props = kafka.consumer_config.clone();

    if engines > 1 {
        if let Some(client_id) = consumer_props.get("client.id").cloned() {
            consumer_props.insert("client.id".to_string(), format!("{client_id}-{index}"));
        }
    }

    EngineConfig {
        consumer_props,
        topic_patterns: kafka.subscribe_topic_patterns.clone(),
        topic_subscribe_delay: Duration::from_millis(kafka.topic_subscribe_delay_millis),
    }
}

// =============================================================================
// SinkRuntime
// =============================================================================

/// The supervisor: owns component lifetimes and the shutdown sequence.
pub struct SinkRuntime {
    config: Arc<SinkConfig>,
    shutdown: ShutdownCoordinator,
}

impl SinkRuntime {
    /// Creates a runtime from a validated configuration.
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the shutdown coordinator, e.g. for tests to stop the
    /// runtime programmatically.
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs the daemon until shutdown.
    pub async fn run(self) -> BinResult<()> {
        info!("starting ribsink v{}", env!("CARGO_PKG_VERSION"));

        let runtime = tokio::runtime::Handle::current();

        // Shared subscription table and its sweeper.
        let subscriptions = SubscriptionTable::new();
        let sweeper = subscriptions.spawn_sweeper();

        // Notification producer.
        let notifier: Arc<dyn NotificationSink> = Arc::new(KafkaNotifier::new(
            &self.config.kafka.producer_config,
            NOTIFICATION_TOPIC,
        )?);

        // Consumer engines, one blocking thread each.
        let stop = self.shutdown.flag();
        let engines = self.config.base.consumer_threads;
        let mut engine_stats: Vec<Arc<EngineStats>> = Vec::with_capacity(engines);
        let mut engine_joins: Vec<JoinHandle<_>> = Vec::with_capacity(engines);

        for index in 0..engines {
            let pg = pg_connect_config(&self.config.postgres);
            let retry = RetryConfig::new().with_jitter(0.3);

            // The engine's own handle for the synchronous inventory
            // path; connect eagerly so a broken database fails startup.
            let engine_db = PgHandle::new(pg.clone(), retry.clone());
            engine_db.connect().await?;
            let engine_db: Arc<dyn Database> = Arc::new(engine_db);

            // Writers connect lazily through the factory.
            let factory: DbFactory = {
                let pg = pg.clone();
                let retry = retry.clone();
                Arc::new(move || {
                    Arc::new(PgHandle::new(pg.clone(), retry.clone())) as Arc<dyn Database>
                })
            };

            let mut pools = HashMap::new();
            for writer_type in WriterType::ALL {
                pools.insert(
                    writer_type,
                    WriterPool::new(
                        writer_type,
                        pool_config(&self.config.base, &self.config.postgres),
                        runtime.clone(),
                        factory.clone(),
                    ),
                );
            }

            let stats = Arc::new(EngineStats::default());
            let dispatcher = Dispatcher::new(
                dispatch_config(&self.config.base, &self.config.postgres, &self.config.kafka),
                engine_db,
                pools,
                subscriptions.clone(),
                notifier.clone(),
                stats.clone(),
            );

            let engine = ConsumerEngine::new(
                engine_config(&self.config.kafka, index, engines),
                dispatcher,
                runtime.clone(),
                stop.clone(),
            )?;

            engine_stats.push(stats);
            engine_joins.push(tokio::task::spawn_blocking(move || engine.run()));

            info!(engine = index, "consumer engine spawned");
        }

        // Statistics logger.
        let stats_task = spawn_stats_logger(
            engine_stats,
            Duration::from_secs(self.config.base.stats_interval),
            self.config.base.heartbeat_max_age,
        );

        // Signal handling: flip the engines' stop flag on SIGTERM et al.
        let coordinator = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            coordinator.wait_for_shutdown().await;
        });

        // Collect engine exits. A bus failure in any engine stops all.
        let mut failure: Option<BinError> = None;
        for (index, join) in engine_joins.into_iter().enumerate() {
            match join.await {
                Ok(Ok(())) => info!(engine = index, "consumer engine exited cleanly"),
                Ok(Err(e)) => {
                    error!(engine = index, error = %e, "consumer engine failed");
                    self.shutdown.initiate_shutdown();
                    failure.get_or_insert(BinError::Bus(e));
                }
                Err(e) => {
                    error!(engine = index, error = %e, "consumer engine thread panicked");
                    self.shutdown.initiate_shutdown();
                    failure.get_or_insert(BinError::initialization("engine thread panicked"));
                }
            }
        }

        signal_task.abort();
        stats_task.abort();
        sweeper.abort();

        match failure {
            Some(e) => Err(e),
            None => {
                info!("ribsink shutdown complete");
                Ok(())
            }
        }
    }
}

// =============================================================================
// Statistics Logger
// =============================================================================

fn spawn_stats_logger(
    engine_stats: Vec<Arc<EngineStats>>,
    interval: Duration,
    heartbeat_max_age_min: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            for (index, stats) in engine_stats.iter().enumerate() {
                let snapshot = stats.snapshot();

                info!(
                    engine = index,
                    messages = snapshot.messages,
                    intake = snapshot.intake_depth,
                    decode_failures = snapshot.decode_failures,
                    by_topic = ?snapshot.by_topic,
                    "engine statistics"
                );

                let last_collector = stats.last_collector_msg_ms.load(Ordering::Relaxed);
                if last_collector > 0 {
                    let age_ms = Utc::now().timestamp_millis() - last_collector;
                    if age_ms > (heartbeat_max_age_min as i64) * 60_000 {
                        warn!(
                            engine = index,
                            age_minutes = age_ms / 60_000,
                            "no collector heartbeat within the alarm window"
                        );
                    }
                }
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
