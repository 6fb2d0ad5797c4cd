// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Dispatcher harness over the mock database.

use std::collections::HashMap;
use std::sync::Arc;

use ribsink_consumer::{DispatchConfig, Dispatcher, EngineStats, MemoryNotifier};
use ribsink_core::subscriptions::SubscriptionTable;
use ribsink_core::types::WriterType;
use ribsink_db::{Database, MockDatabase};
use ribsink_writer::{DbFactory, PoolConfig, WriterPool};

/// A fully wired dispatcher plus handles to everything observable.
pub struct DispatchHarness {
    /// The dispatcher under test.
    pub dispatcher: Dispatcher,
    /// The mock database every writer and the engine share.
    pub db: Arc<MockDatabase>,
    /// The in-memory notification sink.
    pub notifier: Arc<MemoryNotifier>,
    /// The shared subscription table.
    pub subscriptions: SubscriptionTable,
    /// The engine statistics.
    pub stats: Arc<EngineStats>,
}

impl DispatchHarness {
    /// Builds a harness with test-sized pools. Must be called within a
    /// tokio runtime.
    pub fn new() -> Self {
        Self::with_config(DispatchConfig {
            intake_size: 1000,
            db_retries: 1,
            subscription_timeout_seconds: 60,
            attr_cache_age_millis: 1_200_000,
        })
    }

    /// Builds a harness with a custom dispatch configuration.
    pub fn with_config(config: DispatchConfig) -> Self {
        let db = Arc::new(MockDatabase::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let subscriptions = SubscriptionTable::new();
        let stats = Arc::new(EngineStats::default());

        let db_for_factory = db.clone();
        let factory: DbFactory = Arc::new(move || db_for_factory.clone() as Arc<dyn Database>);

        let mut pools = HashMap::new();
        for writer_type in WriterType::ALL {
            pools.insert(
                writer_type,
                WriterPool::new(
                    writer_type,
                    PoolConfig::for_testing(),
                    tokio::runtime::Handle::current(),
                    factory.clone(),
                ),
            );
        }

        let dispatcher = Dispatcher::new(
            config,
            db.clone(),
            pools,
            subscriptions.clone(),
            notifier.clone(),
            stats.clone(),
        );

        Self {
            dispatcher,
            db,
            notifier,
            subscriptions,
            stats,
        }
    }

    /// Feeds one record through the dispatcher with a no-op heartbeat.
    pub async fn feed(&mut self, topic: &str, key: &str, payload: &[u8]) {
        let mut heartbeat = || {};
        self.dispatcher
            .handle_record(topic, Some(key), payload, &mut heartbeat)
            .await;
    }

    /// Flushes the intake and drains the writer fleet.
    pub async fn settle(&mut self) {
        let mut heartbeat = || {};
        self.dispatcher.write_pending();
        self.dispatcher.shutdown(&mut heartbeat).await;
    }
}

impl Default for DispatchHarness {
    fn default() -> Self {
        Self::new()
    }
}
