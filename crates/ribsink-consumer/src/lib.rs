// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-consumer
//!
//! The ingest side of ribsink: the Kafka consumer engine with staged
//! topic subscription and heartbeat-safe pause/resume, the dispatch
//! layer that applies inventory records synchronously and feeds bulk
//! records through the bounded intake into the writer fleet, and the
//! notification fan-out for subscribed resources.
//!
//! The split matters: [`engine`] is the only module that touches the
//! bus client, and [`dispatch`] is fully exercisable without a broker.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod dispatch;
pub mod engine;
pub mod notify;

pub use dispatch::{DispatchConfig, Dispatcher, EngineStats, EngineStatsSnapshot, IntakeItem};
pub use engine::{ConsumerEngine, EngineConfig, SubscriptionStager};
pub use notify::{
    fan_out, matched_resources, KafkaNotifier, MemoryNotifier, NotificationSink,
    NOTIFICATION_TOPIC,
};
