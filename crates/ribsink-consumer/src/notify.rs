// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Notification fan-out.
//!
//! For each unicast prefix record the engine computes the set of
//! subscribed resources it matches - the origin ASN plus every parseable
//! ASN token in the AS path - and emits one `update\t<resource>` record
//! per match to the downstream notification topic.
//!
//! Emission failures are logged and swallowed: notifications are
//! best-effort and must never block ingestion.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rdkafka::producer::{BaseRecord, Producer, ThreadedProducer};
use rdkafka::ClientConfig;
use tracing::{debug, warn};

use ribsink_core::error::{BusError, BusResult};
use ribsink_core::subscriptions::SubscriptionTable;
use ribsink_core::types::UnicastPrefixRec;

/// The downstream topic notifications are produced to.
pub const NOTIFICATION_TOPIC: &str = "bgpdata.parsed.notification";

// =============================================================================
// Resource Matching
// =============================================================================

/// Computes the subscribed resources a prefix record matches.
///
/// - `AS<origin>` when the origin ASN is present and subscribed.
/// - `AS<asn>` for every space-separated AS-path token that parses as a
///   decimal ASN and is subscribed; tokens that fail to parse (AS-set
///   braces, empty strings) are ignored.
///
/// Duplicates collapse; the result is ordered for deterministic
/// emission.
pub fn matched_resources(
    origin_as: Option<u32>,
    as_path: Option<&str>,
    subscriptions: &SubscriptionTable,
) -> BTreeSet<String> {
    let mut matched = BTreeSet::new();

    if let Some(origin) = origin_as {
        let resource = format!("AS{origin}");
        if subscriptions.contains(&resource) {
            matched.insert(resource);
        }
    }

    if let Some(path) = as_path {
        for token in path.split_whitespace() {
            if let Ok(asn) = token.parse::<i64>() {
                let resource = format!("AS{asn}");
                if subscriptions.contains(&resource) {
                    matched.insert(resource);
                }
            }
        }
    }

    matched
}

// =============================================================================
// Notification Sink
// =============================================================================

/// Destination for notification records.
///
/// `notify` must not block and must not fail loudly - implementations
/// log and swallow their own errors.
pub trait NotificationSink: Send + Sync {
    /// Emits one `update\t<resource>` record.
    fn notify(&self, resource: &str);

    /// Flushes buffered records during shutdown.
    fn close(&self) {}
}

/// Fans a batch of prefix records out to a sink.
pub fn fan_out(
    sink: &dyn NotificationSink,
    records: &[UnicastPrefixRec],
    subscriptions: &SubscriptionTable,
) {
    if subscriptions.is_empty() {
        return;
    }

    for rec in records {
        for resource in matched_resources(rec.origin_as, rec.as_path.as_deref(), subscriptions) {
            sink.notify(&resource);
        }
    }
}

// =============================================================================
// Kafka Notifier
// =============================================================================

/// Kafka-backed notification sink.
pub struct KafkaNotifier {
    producer: ThreadedProducer<rdkafka::producer::DefaultProducerContext>,
    topic: String,
    emitted: AtomicU64,
    errors: AtomicU64,
}

impl KafkaNotifier {
    /// Creates a notifier from producer properties.
    pub fn new(
        producer_props: &std::collections::HashMap<String, String>,
        topic: impl Into<String>,
    ) -> BusResult<Self> {
        let mut config = ClientConfig::new();
        for (k, v) in producer_props {
            config.set(k, v);
        }

        let producer: ThreadedProducer<_> = config
            .create()
            .map_err(|e| BusError::create(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.into(),
            emitted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    /// Returns the number of records emitted.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Returns the number of swallowed emission errors.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl NotificationSink for KafkaNotifier {
    fn notify(&self, resource: &str) {
        let value = format!("update\t{resource}");
        let record = BaseRecord::to(&self.topic).key(resource).payload(&value);

        match self.producer.send(record) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                debug!(resource, "notification emitted");
            }
            Err((e, _)) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(resource, error = %e, "failed to emit notification");
            }
        }
    }

    fn close(&self) {
        if let Err(e) = self.producer.flush(std::time::Duration::from_secs(5)) {
            warn!(error = %e, "notification producer flush failed");
        }
    }
}

impl std::fmt::Debug for KafkaNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaNotifier")
            .field("topic", &self.topic)
            .field("emitted", &self.emitted())
            .field("errors", &self.errors())
            .finish()
    }
}

// =============================================================================
// Memory Notifier (for tests)
// =============================================================================

/// An in-memory sink that records notifications.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    records: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the emitted `update\t<resource>` values, in order.
    pub fn records(&self) -> Vec<String> {
        self.records.lock().unwrap().clone()
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify(&self, resource: &str) {
        self.records
            .lock()
            .unwrap()
            .push(format!("update\t{resource}"));
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(origin: Option<u32>, path: Option<&str>) -> UnicastPrefixRec {
        UnicastPrefixRec {
            hash: "x1".into(),
            peer_hash: "p1".into(),
            base_attr_hash: "a1".into(),
            is_ipv4: true,
            origin_as: origin,
            prefix: "10.0.0.0".into(),
            prefix_len: 24,
            timestamp: "2025-06-01 10:00:00".into(),
            is_withdrawn: false,
            path_id: 0,
            labels: String::new(),
            is_pre_policy: true,
            is_adj_rib_in: true,
            as_path: path.map(String::from),
        }
    }

    #[test]
    fn test_origin_and_path_match_collapse() {
        let subs = SubscriptionTable::new();
        subs.subscribe("AS15169", 60);

        // Origin and path both name AS15169: one match.
        let matched = matched_resources(Some(15169), Some("64512 15169"), &subs);
        assert_eq!(matched.len(), 1);
        assert!(matched.contains("AS15169"));
    }

    #[test]
    fn test_unparseable_tokens_ignored() {
        let subs = SubscriptionTable::new();
        subs.subscribe("AS64512", 60);

        let matched = matched_resources(None, Some("{64500,64501} 64512 not-an-asn"), &subs);
        assert_eq!(matched.len(), 1);
        assert!(matched.contains("AS64512"));
    }

    #[test]
    fn test_empty_path_matches_origin_only() {
        let subs = SubscriptionTable::new();
        subs.subscribe("AS64500", 60);

        let matched = matched_resources(Some(64500), Some(""), &subs);
        assert_eq!(matched.len(), 1);

        let matched = matched_resources(Some(64500), None, &subs);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_no_subscription_no_match() {
        let subs = SubscriptionTable::new();
        let matched = matched_resources(Some(64500), Some("64500 64501"), &subs);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_fan_out_emits_per_match() {
        let subs = SubscriptionTable::new();
        subs.subscribe("AS15169", 60);
        let sink = MemoryNotifier::new();

        fan_out(
            &sink,
            &[prefix(Some(15169), Some("64512 15169"))],
            &subs,
        );

        assert_eq!(sink.records(), vec!["update\tAS15169"]);
    }

    #[test]
    fn test_fan_out_multiple_resources() {
        let subs = SubscriptionTable::new();
        subs.subscribe("AS64512", 60);
        subs.subscribe("AS15169", 60);
        let sink = MemoryNotifier::new();

        fan_out(&sink, &[prefix(Some(15169), Some("64512 15169"))], &subs);

        let mut records = sink.records();
        records.sort();
        assert_eq!(records, vec!["update\tAS15169", "update\tAS64512"]);
    }

    #[test]
    fn test_fan_out_skips_without_subscriptions() {
        let sink = MemoryNotifier::new();
        fan_out(&sink, &[prefix(Some(1), Some("1 2 3"))], &SubscriptionTable::new());
        assert!(sink.records().is_empty());
    }
}
