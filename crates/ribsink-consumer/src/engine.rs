// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! The partition-aware consumer engine.
//!
//! One engine owns one Kafka consumer and runs on one dedicated thread -
//! the consumer object is never touched from anywhere else. The loop:
//!
//! ```text
//! while not stopped:
//!     subscribe_next_if_due()          # staged topic subscription
//!     records = poll(10 ms)
//!     if empty: write_pending(); continue
//!     pause(assignment)                # stop fetching, keep heartbeats
//!     for r in records: dispatch(r)    # heartbeat polls interleaved
//!     periodic_writer_check()
//!     write_pending()
//!     resume()
//! ```
//!
//! **Staged subscription**: topic patterns are subscribed one at a time,
//! `topic_subscribe_delay` apart, in config order - inventory topics
//! first, NLRI topics later - so router and peer rows exist before
//! prefixes referencing them arrive. Offsets are committed before each
//! widening step.
//!
//! **Pause-for-heartbeat**: while a fetched batch is being dispatched
//! the assigned partitions are paused; zero-duration polls issued from
//! the dispatch path then serve as pure heartbeats, keeping group
//! membership alive under arbitrarily slow database writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, ClientContext, TopicPartitionList};
use tracing::{debug, info, warn};

use ribsink_core::error::{BusError, BusResult};

use crate::dispatch::Dispatcher;

/// Fetch poll timeout.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Fallback batch cap when `max.poll.records` is absent.
const DEFAULT_MAX_POLL_RECORDS: usize = 500;

// =============================================================================
// Configuration
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Opaque consumer properties handed to the bus client. The
    /// Java-world `max.poll.records` key is honored here as the engine's
    /// batch cap and withheld from librdkafka, which does not know it.
    pub consumer_props: HashMap<String, String>,
    /// Topic patterns in subscription order.
    pub topic_patterns: Vec<String>,
    /// Delay between subscription steps.
    pub topic_subscribe_delay: Duration,
}

// =============================================================================
// Consumer Context
// =============================================================================

/// rdkafka context that logs consumer group rebalances.
///
/// Callbacks run on the client's background thread; they only log.
pub struct SinkConsumerContext;

impl ClientContext for SinkConsumerContext {}

impl ConsumerContext for SinkConsumerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => {
                info!(partitions = tpl.count(), "rebalance: partitions assigned");
            }
            Rebalance::Revoke(tpl) => {
                info!(partitions = tpl.count(), "rebalance: partitions revoked");
            }
            Rebalance::Error(e) => {
                warn!(error = %e, "rebalance error");
            }
        }
    }
}

// =============================================================================
// Subscription Stager
// =============================================================================

/// Paces the staged topic subscription.
///
/// Each step appends the next pattern to a cumulative alternation; the
/// engine re-subscribes with the widened regex. At wall-clock time
/// `t0 + k·delay` at most `k + 1` patterns are active.
#[derive(Debug)]
pub struct SubscriptionStager {
    patterns: Vec<String>,
    delay: Duration,
    subscribed: usize,
    last_step: Option<Instant>,
    cumulative: String,
}

impl SubscriptionStager {
    /// Creates a stager over the configured patterns.
    pub fn new(patterns: Vec<String>, delay: Duration) -> Self {
        Self {
            patterns,
            delay,
            subscribed: 0,
            last_step: None,
            cumulative: String::new(),
        }
    }

    /// Returns `true` once every pattern has been subscribed.
    pub fn is_complete(&self) -> bool {
        self.subscribed >= self.patterns.len()
    }

    /// Returns the number of patterns subscribed so far.
    pub fn subscribed(&self) -> usize {
        self.subscribed
    }

    /// If the next step is due at `now`, widens the cumulative pattern
    /// and returns `(step_pattern, full_regex)` to subscribe with.
    pub fn next_due(&mut self, now: Instant) -> Option<(String, String)> {
        if self.is_complete() {
            return None;
        }

        let due = match self.last_step {
            None => true,
            Some(last) => now.duration_since(last) >= self.delay,
        };
        if !due {
            return None;
        }

        let pattern = self.patterns[self.subscribed].clone();
        if self.subscribed > 0 {
            self.cumulative.push('|');
        }
        self.cumulative.push('(');
        self.cumulative.push_str(&pattern);
        self.cumulative.push(')');

        self.subscribed += 1;
        self.last_step = Some(now);

        Some((pattern, format!("^({})", self.cumulative)))
    }
}

// =============================================================================
// Bus Record
// =============================================================================

/// An owned copy of one fetched bus record.
#[derive(Debug)]
struct BusRecord {
    topic: String,
    key: Option<String>,
    payload: Vec<u8>,
}

// =============================================================================
// Consumer Engine
// =============================================================================

/// One consumer engine: a Kafka consumer plus the dispatcher behind it.
pub struct ConsumerEngine {
    consumer: BaseConsumer<SinkConsumerContext>,
    dispatcher: Dispatcher,
    runtime: tokio::runtime::Handle,
    stop: Arc<AtomicBool>,
    stager: SubscriptionStager,
    paused: Option<TopicPartitionList>,
    max_poll_records: usize,
}

impl ConsumerEngine {
    /// Creates the engine and its bus client.
    ///
    /// Fails fast on bad client configuration - the supervisor turns
    /// this into exit code 1.
    pub fn new(
        config: EngineConfig,
        dispatcher: Dispatcher,
        runtime: tokio::runtime::Handle,
        stop: Arc<AtomicBool>,
    ) -> BusResult<Self> {
        let mut client_config = ClientConfig::new();
        let mut max_poll_records = DEFAULT_MAX_POLL_RECORDS;

        for (k, v) in &config.consumer_props {
            if k == "max.poll.records" {
                max_poll_records = v.parse().unwrap_or(DEFAULT_MAX_POLL_RECORDS);
                continue;
            }
            client_config.set(k, v);
        }

        let consumer: BaseConsumer<SinkConsumerContext> = client_config
            .create_with_context(SinkConsumerContext)
            .map_err(|e| BusError::create(e.to_string()))?;

        Ok(Self {
            consumer,
            dispatcher,
            runtime,
            stop,
            stager: SubscriptionStager::new(config.topic_patterns, config.topic_subscribe_delay),
            paused: None,
            max_poll_records,
        })
    }

    /// Runs the engine until stopped. Blocking; call on a dedicated
    /// thread.
    pub fn run(mut self) -> BusResult<()> {
        info!("consumer engine started");

        self.runtime
            .clone()
            .block_on(self.dispatcher.refresh_router_cache());

        let mut all_subscribed_logged = false;

        while !self.stop.load(Ordering::SeqCst) {
            if !self.stager.is_complete() {
                self.subscribe_next_if_due()?;
            } else if !all_subscribed_logged {
                all_subscribed_logged = true;
                info!(
                    patterns = self.stager.subscribed(),
                    "all topic patterns subscribed"
                );
            }

            let records = match self.fetch_batch() {
                Ok(records) => records,
                Err(e) => {
                    // Runtime bus failure: log, stop, shut down cleanly.
                    warn!(error = %e, "bus error, stopping consumer engine");
                    break;
                }
            };

            if records.is_empty() {
                self.dispatcher.write_pending();
                continue;
            }

            self.pause_all();

            {
                let consumer = &self.consumer;
                let dispatcher = &mut self.dispatcher;
                let runtime = &self.runtime;
                let mut heartbeat = || {
                    let _ = consumer.poll(Duration::ZERO);
                };

                for record in &records {
                    runtime.block_on(dispatcher.handle_record(
                        &record.topic,
                        record.key.as_deref(),
                        &record.payload,
                        &mut heartbeat,
                    ));
                }

                dispatcher.periodic_writer_check(&mut heartbeat);
                dispatcher.write_pending();
            }

            self.resume();

            if self.dispatcher.drain_failed() {
                warn!("writer drain deadline exceeded, stopping consumer engine");
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(mut self) {
        info!("consumer engine shutting down");

        let consumer = &self.consumer;
        let dispatcher = &mut self.dispatcher;
        let mut heartbeat = || {
            let _ = consumer.poll(Duration::ZERO);
        };

        self.runtime
            .block_on(dispatcher.shutdown(&mut heartbeat));

        // Dropping the consumer leaves the group; offsets were committed
        // by the client's auto-commit along the way.
        info!("consumer engine stopped");
    }

    // -------------------------------------------------------------------------
    // Subscription
    // -------------------------------------------------------------------------

    fn subscribe_next_if_due(&mut self) -> BusResult<()> {
        let Some((pattern, full_regex)) = self.stager.next_due(Instant::now()) else {
            return Ok(());
        };

        // Settle consumed offsets before widening the subscription.
        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
            debug!(error = %e, "offset commit before subscription step");
        }

        self.consumer
            .subscribe(&[full_regex.as_str()])
            .map_err(|e| BusError::subscribe(pattern.clone(), e.to_string()))?;

        info!(pattern = %pattern, step = self.stager.subscribed(), "subscribed to topic pattern");
        debug!(cumulative = %full_regex, "cumulative subscription pattern");

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Fetch / pause / resume
    // -------------------------------------------------------------------------

    fn fetch_batch(&self) -> BusResult<Vec<BusRecord>> {
        let mut records = Vec::new();

        match self.consumer.poll(POLL_TIMEOUT) {
            None => return Ok(records),
            Some(Err(e)) => return Err(BusError::poll(e.to_string())),
            Some(Ok(msg)) => records.push(to_owned_record(&msg)),
        }

        // Drain whatever else the client already fetched, up to the cap.
        while records.len() < self.max_poll_records {
            match self.consumer.poll(Duration::ZERO) {
                None => break,
                Some(Err(e)) => {
                    warn!(error = %e, "poll error while draining batch");
                    break;
                }
                Some(Ok(msg)) => records.push(to_owned_record(&msg)),
            }
        }

        Ok(records)
    }

    fn pause_all(&mut self) {
        match self.consumer.assignment() {
            Ok(tpl) if tpl.count() > 0 => match self.consumer.pause(&tpl) {
                Ok(()) => self.paused = Some(tpl),
                Err(e) => warn!(error = %e, "failed to pause partitions"),
            },
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read assignment"),
        }
    }

    fn resume(&mut self) {
        if let Some(tpl) = self.paused.take() {
            if let Err(e) = self.consumer.resume(&tpl) {
                warn!(error = %e, "failed to resume partitions");
            }
        }
    }
}

fn to_owned_record(msg: &rdkafka::message::BorrowedMessage<'_>) -> BusRecord {
    BusRecord {
        topic: msg.topic().to_string(),
        key: msg
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec![
            r"bgpdata\.parsed\.collector".to_string(),
            r"bgpdata\.parsed\.router".to_string(),
            r"bgpdata\.parsed\.peer".to_string(),
            r"bgpdata\.parsed\.(unicast_prefix|base_attribute)".to_string(),
        ]
    }

    #[test]
    fn test_stager_first_step_immediate() {
        let mut stager = SubscriptionStager::new(patterns(), Duration::from_secs(10));
        let now = Instant::now();

        let (pattern, full) = stager.next_due(now).unwrap();
        assert_eq!(pattern, r"bgpdata\.parsed\.collector");
        assert_eq!(full, r"^((bgpdata\.parsed\.collector))");
        assert_eq!(stager.subscribed(), 1);
    }

    #[test]
    fn test_stager_paces_steps() {
        let mut stager = SubscriptionStager::new(patterns(), Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(stager.next_due(t0).is_some());
        // Not due yet.
        assert!(stager.next_due(t0 + Duration::from_secs(5)).is_none());
        // Due at the full delay.
        let (pattern, full) = stager.next_due(t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(pattern, r"bgpdata\.parsed\.router");
        assert!(full.contains(r"(bgpdata\.parsed\.collector)|(bgpdata\.parsed\.router)"));
    }

    #[test]
    fn test_stager_monotonic_bound() {
        // At t0 + k*delay at most k+1 patterns are subscribed.
        let delay = Duration::from_secs(10);
        let mut stager = SubscriptionStager::new(patterns(), delay);
        let t0 = Instant::now();

        for k in 0..8u32 {
            let now = t0 + delay * k;
            let _ = stager.next_due(now);
            assert!(
                stager.subscribed() <= (k as usize) + 1,
                "at step {k}: {} subscribed",
                stager.subscribed()
            );
        }
    }

    #[test]
    fn test_stager_completes_and_stops() {
        let mut stager = SubscriptionStager::new(patterns(), Duration::ZERO);
        let now = Instant::now();

        let mut steps = 0;
        while stager.next_due(now + Duration::from_millis(steps)).is_some() {
            steps += 1;
        }

        assert_eq!(steps, 4);
        assert!(stager.is_complete());
        assert!(stager.next_due(now + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_stager_alternation_groups_each_pattern() {
        let mut stager = SubscriptionStager::new(patterns(), Duration::ZERO);
        let now = Instant::now();

        let mut last_full = String::new();
        while let Some((_, full)) = stager.next_due(now) {
            last_full = full;
        }

        // Every pattern is wrapped in its own group inside the outer one.
        assert!(last_full.starts_with("^("));
        assert!(last_full.matches('|').count() >= 3);
        assert!(last_full.contains(r"(bgpdata\.parsed\.(unicast_prefix|base_attribute))"));
    }
}
