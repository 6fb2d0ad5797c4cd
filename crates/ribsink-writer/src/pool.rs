// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! The per-type writer pool.
//!
//! The pool owns an ordered list of writers (index 0 is permanent;
//! scale-down always removes from the tail) and routes intake items to
//! them with sticky per-key assignment: once a key is assigned to a
//! writer, every later item for that key goes to the same writer until a
//! drain clears the assignment. Keeping one writer per key serializes
//! writes to the same rows and avoids lock waits between connections.
//!
//! All pool methods run on the consumer engine thread. Drains busy-wait
//! in millisecond steps and invoke the caller's heartbeat callback so the
//! engine can keep its bus group membership alive while it waits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ribsink_core::types::WriterType;
use ribsink_db::Database;
use ribsink_query::QueryTriple;

use crate::writer::{WriterConfig, WriterHandle};

/// Join budget applied when stopping a writer.
const JOIN_DEADLINE: Duration = Duration::from_secs(5);

/// Drain iterations between heartbeat callbacks (1 ms sleep each).
const HEARTBEAT_EVERY: u32 = 1000;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a writer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum writers in the pool.
    #[serde(default = "default_max_writers")]
    pub max_writers: usize,

    /// Consecutive above-watermark samples tolerated before scaling or
    /// rebalancing.
    #[serde(default = "default_allowed_over")]
    pub allowed_over_queue_times: u32,

    /// Minimum quiet period before a writer is removed.
    #[serde(default = "default_scale_back_after")]
    #[serde(with = "duration_secs")]
    pub scale_back_after: Duration,

    /// Interval between rebalance passes.
    #[serde(default = "default_rebalance_interval")]
    #[serde(with = "duration_secs")]
    pub rebalance_interval: Duration,

    /// Deadline for draining one writer queue.
    #[serde(default = "default_drain_deadline")]
    #[serde(with = "duration_secs")]
    pub drain_deadline: Duration,

    /// Per-writer configuration.
    #[serde(default)]
    pub writer: WriterConfig,
}

fn default_max_writers() -> usize {
    3
}

fn default_allowed_over() -> u32 {
    2
}

fn default_scale_back_after() -> Duration {
    Duration::from_secs(1800)
}

fn default_rebalance_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_drain_deadline() -> Duration {
    Duration::from_secs(30)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_writers: default_max_writers(),
            allowed_over_queue_times: default_allowed_over(),
            scale_back_after: default_scale_back_after(),
            rebalance_interval: default_rebalance_interval(),
            drain_deadline: default_drain_deadline(),
            writer: WriterConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration for tests: no time gates, tiny queues.
    pub fn for_testing() -> Self {
        Self {
            max_writers: 3,
            allowed_over_queue_times: 1,
            scale_back_after: Duration::ZERO,
            rebalance_interval: Duration::ZERO,
            drain_deadline: Duration::from_secs(5),
            writer: WriterConfig::for_testing(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of one writer, for stats logging.
#[derive(Debug, Clone, Serialize)]
pub struct WriterSnapshot {
    /// Keys sticky to the writer.
    pub assigned: usize,
    /// Queued plus in-flight items.
    pub queue: usize,
    /// Consecutive above-watermark samples.
    pub above_count: u32,
    /// Messages routed since the last reset.
    pub message_count: u64,
}

// =============================================================================
// Writer Pool
// =============================================================================

/// Factory producing one database handle per writer.
pub type DbFactory = Arc<dyn Fn() -> Arc<dyn Database> + Send + Sync>;

/// A pool of writers for one [`WriterType`].
pub struct WriterPool {
    writer_type: WriterType,
    config: PoolConfig,
    runtime: tokio::runtime::Handle,
    make_db: DbFactory,
    writers: Vec<WriterHandle>,
    last_change: Instant,
    drain_failed: bool,
}

impl WriterPool {
    /// Creates a pool with one writer.
    pub fn new(
        writer_type: WriterType,
        config: PoolConfig,
        runtime: tokio::runtime::Handle,
        make_db: DbFactory,
    ) -> Self {
        let mut pool = Self {
            writer_type,
            config,
            runtime,
            make_db,
            writers: Vec::new(),
            last_change: Instant::now(),
            drain_failed: false,
        };

        pool.spawn_writer();
        pool
    }

    fn spawn_writer(&mut self) {
        let db = (self.make_db)();
        let handle = WriterHandle::spawn(&self.runtime, self.config.writer.clone(), db);
        self.writers.push(handle);
    }

    /// Returns the number of writers.
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Returns `true` if the pool has no writers.
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Returns queued plus in-flight items across all writers.
    pub fn total_pending(&self) -> usize {
        self.writers.iter().map(WriterHandle::pending).sum()
    }

    /// Returns `true` once a drain has blown its deadline. The
    /// supervisor treats this as fatal.
    pub fn drain_failed(&self) -> bool {
        self.drain_failed
    }

    /// Returns per-writer snapshots for stats logging.
    pub fn snapshot(&self) -> Vec<WriterSnapshot> {
        self.writers
            .iter()
            .map(|w| WriterSnapshot {
                assigned: w.assigned.len(),
                queue: w.pending(),
                above_count: w.above_count,
                message_count: w.message_count,
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Routing
    // -------------------------------------------------------------------------

    /// Routes a key to a writer index, assigning it if new.
    ///
    /// Order is important for state data. Sticky load balance: ensuring
    /// the same writer handles the same key keeps per-key statements
    /// serial and avoids deadlocks between connections.
    pub fn route(&mut self, key: &str) -> usize {
        if let Some(i) = self.writers.iter().position(|w| w.assigned.contains(key)) {
            self.writers[i].message_count += 1;
            return i;
        }

        let threshold = self.config.writer.queue_size / 2;

        // A writer that lost all assignments starts over on counts.
        for w in self.writers.iter_mut() {
            if w.assigned.is_empty() {
                w.message_count = 0;
            }
        }

        let mut cur = 0usize;
        for i in 1..self.writers.len() {
            let cur_assigned = self.writers[cur].assigned.len();
            let cur_queue = self.writers[cur].pending();
            let cur_count = self.writers[cur].message_count;

            let cand_assigned = self.writers[i].assigned.len();
            let cand_queue = self.writers[i].pending();
            let cand_count = self.writers[i].message_count;

            if cur_assigned != 0
                && (cand_assigned == 0
                    || (cand_queue < threshold && cur_queue > threshold)
                    || cur_count > cand_count)
            {
                cur = i;
            }
        }

        self.writers[cur].assigned.insert(key.to_string());
        self.writers[cur].message_count += 1;
        cur
    }

    /// Attempts to enqueue onto the writer at `idx`.
    ///
    /// Returns the triple back when that writer's queue is full.
    pub fn try_send(&self, idx: usize, triple: QueryTriple) -> Result<(), QueryTriple> {
        self.writers[idx].try_enqueue(triple)
    }

    // -------------------------------------------------------------------------
    // Drain / Reset
    // -------------------------------------------------------------------------

    /// Drains one writer's queue to empty, then clears its routing
    /// state.
    ///
    /// Returns `false` (and latches `drain_failed`) if the deadline
    /// passes first.
    fn drain_one(&mut self, idx: usize, heartbeat: &mut dyn FnMut()) -> bool {
        info!(
            pool = %self.writer_type,
            writer = idx,
            queue = self.writers[idx].pending(),
            "draining writer queue"
        );

        let deadline = Instant::now() + self.config.drain_deadline;
        let mut i: u32 = 0;

        while self.writers[idx].pending() > 0 {
            if Instant::now() > deadline {
                warn!(
                    pool = %self.writer_type,
                    writer = idx,
                    queue = self.writers[idx].pending(),
                    "writer drain deadline exceeded"
                );
                self.drain_failed = true;
                return false;
            }

            if i >= HEARTBEAT_EVERY {
                i = 0;
                heartbeat();
                info!(
                    pool = %self.writer_type,
                    writer = idx,
                    queue = self.writers[idx].pending(),
                    "... still draining writer queue"
                );
            }
            i += 1;

            std::thread::sleep(Duration::from_millis(1));
        }

        self.writers[idx].reset_routing();
        true
    }

    /// Drains every writer and clears all routing state.
    ///
    /// A single-writer pool is left untouched: with one writer there is
    /// nothing to redistribute.
    fn reset_all(&mut self, heartbeat: &mut dyn FnMut()) -> bool {
        if self.writers.len() <= 1 {
            return true;
        }

        info!(pool = %self.writer_type, "draining queues to reset writers");

        for idx in 0..self.writers.len() {
            if !self.drain_one(idx, heartbeat) {
                return false;
            }
        }
        true
    }

    // -------------------------------------------------------------------------
    // Scaling
    // -------------------------------------------------------------------------

    /// Adds a writer after resetting the pool.
    ///
    /// Public so the supervisor can pre-warm a pool; the usual caller
    /// is [`WriterPool::check`].
    pub fn add_writer(&mut self, heartbeat: &mut dyn FnMut()) {
        info!(pool = %self.writer_type, writers = self.writers.len(), "adding writer");

        self.reset_all(heartbeat);
        self.spawn_writer();
        self.last_change = Instant::now();

        info!(pool = %self.writer_type, writers = self.writers.len(), "done adding writer");
    }

    /// Removes the tail writer, gated on the scale-back quiet period.
    fn remove_tail(&mut self, heartbeat: &mut dyn FnMut()) {
        if self.last_change.elapsed() < self.config.scale_back_after {
            return;
        }

        if self.writers.len() <= 1 {
            return;
        }

        self.last_change = Instant::now();
        info!(pool = %self.writer_type, "removing tail writer");

        self.reset_all(heartbeat);

        if let Some(mut writer) = self.writers.pop() {
            writer.begin_shutdown();
            if !writer.join_blocking(JOIN_DEADLINE) {
                warn!(pool = %self.writer_type, "timed out joining removed writer");
            }
        }

        info!(pool = %self.writer_type, writers = self.writers.len(), "done removing writer");
    }

    /// Rebalance pass: any writer stuck above the watermark with more
    /// than one key is drained so its keys redistribute.
    ///
    /// Returns `true` if any writer was rebalanced.
    fn rebalance(&mut self, heartbeat: &mut dyn FnMut()) -> bool {
        if self.last_change.elapsed() < self.config.rebalance_interval {
            return false;
        }
        self.last_change = Instant::now();

        let mut rebalanced = false;

        for idx in 0..self.writers.len() {
            let over = self.writers[idx].above_count > self.config.allowed_over_queue_times
                && self.writers[idx].assigned.len() > 1;

            if over {
                rebalanced = true;
                self.drain_one(idx, heartbeat);
            } else {
                self.writers[idx].message_count = self.writers[idx].pending() as u64;
            }
        }

        rebalanced
    }

    /// Periodic sample (10-second cadence, driven by the engine):
    /// rebalance first, otherwise update above-counts and scale.
    pub fn check(&mut self, heartbeat: &mut dyn FnMut()) {
        if self.rebalance(heartbeat) {
            return;
        }

        let high = self.config.writer.queue_size * 3 / 4;
        let low = self.config.writer.queue_size / 5;
        let mut below = 0usize;

        for idx in 0..self.writers.len() {
            let pending = self.writers[idx].pending();

            if pending > high {
                if self.writers[idx].above_count > self.config.allowed_over_queue_times {
                    if self.writers.len() < self.config.max_writers {
                        info!(
                            pool = %self.writer_type,
                            writer = idx,
                            queue = pending,
                            "writer persistently over watermark, scaling up"
                        );
                        self.writers[idx].above_count = 0;
                        self.add_writer(heartbeat);
                        break;
                    }

                    info!(
                        pool = %self.writer_type,
                        writer = idx,
                        queue = pending,
                        writers = self.writers.len(),
                        "writer over watermark, already at max writers"
                    );
                } else {
                    self.writers[idx].above_count += 1;
                }
            } else if pending < low {
                self.writers[idx].above_count = 0;
                below += 1;
            }
        }

        if below >= self.writers.len() {
            self.remove_tail(heartbeat);
        }
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Drains and stops every writer.
    pub fn shutdown(&mut self, heartbeat: &mut dyn FnMut()) {
        self.reset_all(heartbeat);

        info!(pool = %self.writer_type, writers = self.writers.len(), "shutting down writers");

        for writer in self.writers.iter_mut() {
            writer.begin_shutdown();
        }

        for writer in self.writers.iter() {
            if !writer.join_blocking(JOIN_DEADLINE) {
                warn!(pool = %self.writer_type, "timed out joining writer, exiting uncleanly");
            }
        }

        self.writers.clear();
    }
}

impl std::fmt::Debug for WriterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterPool")
            .field("writer_type", &self.writer_type)
            .field("writers", &self.writers.len())
            .field("total_pending", &self.total_pending())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
