// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Notification subscription table.
//!
//! Resources (e.g. `AS15169`) subscribe with a TTL; a background sweeper
//! removes expired entries every 30 seconds. The table is shared between
//! the consumer engine (inserts and lookups) and the sweeper task, so it
//! uses a concurrent map.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Interval between sweeper passes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Subscription Table
// =============================================================================

/// Concurrent map of subscribed resource → expiration time (epoch ms).
///
/// Cloning is cheap; all clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionTable {
    inner: Arc<DashMap<String, i64>>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or refreshes a subscription with the given TTL.
    ///
    /// Returns the new expiration time in epoch milliseconds.
    pub fn subscribe(&self, resource: &str, ttl_seconds: u64) -> i64 {
        let expiration = Utc::now().timestamp_millis() + (ttl_seconds as i64) * 1000;
        self.inner.insert(resource.to_string(), expiration);
        expiration
    }

    /// Returns `true` if the resource has a subscription entry.
    ///
    /// Entries past their expiration still match until the sweeper removes
    /// them; the sweep cadence bounds the overshoot at 30 seconds.
    pub fn contains(&self, resource: &str) -> bool {
        self.inner.contains_key(resource)
    }

    /// Removes entries whose expiration is at or before `now_ms`.
    ///
    /// Returns the number of removed entries.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, expiration| *expiration > now_ms);
        before - self.inner.len()
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Spawns the periodic sweeper task.
    ///
    /// The task runs until aborted; the supervisor holds the handle and
    /// aborts it during shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let table = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let expired = table.sweep(Utc::now().timestamp_millis());
                if expired > 0 {
                    info!(expired, "expired subscriptions");
                } else {
                    debug!(live = table.len(), "subscription sweep, nothing expired");
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_contains() {
        let table = SubscriptionTable::new();
        assert!(!table.contains("AS65000"));

        table.subscribe("AS65000", 60);
        assert!(table.contains("AS65000"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_subscribe_refreshes_expiration() {
        let table = SubscriptionTable::new();
        let first = table.subscribe("AS65000", 1);
        let second = table.subscribe("AS65000", 120);
        assert!(second > first);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let table = SubscriptionTable::new();
        let now = Utc::now().timestamp_millis();

        table.inner.insert("AS1".into(), now - 1);
        table.inner.insert("AS2".into(), now + 60_000);

        let removed = table.sweep(now);
        assert_eq!(removed, 1);
        assert!(!table.contains("AS1"));
        assert!(table.contains("AS2"));
    }

    #[test]
    fn test_clones_share_state() {
        let table = SubscriptionTable::new();
        let clone = table.clone();

        table.subscribe("AS65000", 60);
        assert!(clone.contains("AS65000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let table = SubscriptionTable::new();
        let now = Utc::now().timestamp_millis();
        table.inner.insert("AS1".into(), now - 1);

        let handle = table.spawn_sweeper();

        // First tick fires immediately; advance past it and a full period.
        tokio::time::advance(SWEEP_INTERVAL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        assert!(!table.contains("AS1"));
        handle.abort();
    }
}
