// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! The batching writer task.
//!
//! A writer owns one database handle and a bounded inbound queue of
//! [`QueryTriple`]s. Its loop:
//!
//! 1. Block-dequeue up to `batch_records` items or until
//!    `batch_time` elapses, whichever comes first.
//! 2. Merge all items that share the same `(prefix, suffix)` by unioning
//!    their value maps; a key collision keeps the later tuple.
//! 3. Assemble each merged group into one bulk statement and hand it to
//!    the database handle.
//!
//! The writer has no knowledge of routing. The pool-side
//! [`WriterHandle`] tracks queue depth (queued plus in-flight, so a
//! drained queue implies the items were written), sticky assignments and
//! the counters the pool's scaling decisions read.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use ribsink_db::Database;
use ribsink_query::QueryTriple;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one writer task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Inbound queue capacity.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Maximum records merged into one batch.
    #[serde(default = "default_batch_records")]
    pub batch_records: usize,

    /// Maximum time a batch is held open.
    #[serde(default = "default_batch_time")]
    #[serde(with = "duration_millis")]
    pub batch_time: Duration,

    /// Retry budget handed to the database on each statement.
    #[serde(default = "default_db_retries")]
    pub db_retries: u32,
}

fn default_queue_size() -> usize {
    20_000
}

fn default_batch_records() -> usize {
    3000
}

fn default_batch_time() -> Duration {
    Duration::from_millis(300)
}

fn default_db_retries() -> u32 {
    10
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            batch_records: default_batch_records(),
            batch_time: default_batch_time(),
            db_retries: default_db_retries(),
        }
    }
}

impl WriterConfig {
    /// Creates a configuration for tests: tiny batches, fast deadlines.
    pub fn for_testing() -> Self {
        Self {
            queue_size: 64,
            batch_records: 10,
            batch_time: Duration::from_millis(20),
            db_retries: 1,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// =============================================================================
// Writer State
// =============================================================================

/// Lifecycle state of a writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterState {
    /// Accepting and writing batches.
    Running = 0,
    /// No longer accepting; finishing queued work.
    Draining = 1,
    /// Task has exited.
    Stopped = 2,
}

impl WriterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WriterState::Running,
            1 => WriterState::Draining,
            _ => WriterState::Stopped,
        }
    }
}

// =============================================================================
// Writer Statistics
// =============================================================================

/// Atomic counters shared between the task and its handle.
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Batches shipped successfully.
    pub batches_written: AtomicU64,
    /// Value tuples shipped successfully.
    pub tuples_written: AtomicU64,
    /// Batches dropped after a database failure.
    pub batches_failed: AtomicU64,
}

// =============================================================================
// Writer Handle
// =============================================================================

/// Pool-side handle to one writer task.
///
/// The routing bookkeeping (`assigned`, `message_count`, `above_count`)
/// is owned by the pool and only ever touched from the consumer engine
/// thread; the queue depth and state are shared with the task.
pub struct WriterHandle {
    tx: Option<mpsc::Sender<QueryTriple>>,
    depth: Arc<AtomicUsize>,
    state: Arc<AtomicU8>,
    stats: Arc<WriterStats>,
    join: JoinHandle<()>,

    /// Keys currently sticky to this writer.
    pub assigned: HashSet<String>,
    /// Messages routed here since the last reset.
    pub message_count: u64,
    /// Consecutive samples observed above the high-water mark.
    pub above_count: u32,
}

impl WriterHandle {
    /// Spawns a writer task on the given runtime and returns its handle.
    pub fn spawn(
        runtime: &tokio::runtime::Handle,
        config: WriterConfig,
        db: Arc<dyn Database>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let depth = Arc::new(AtomicUsize::new(0));
        let state = Arc::new(AtomicU8::new(WriterState::Running as u8));
        let stats = Arc::new(WriterStats::default());

        let join = runtime.spawn(run_writer(
            config,
            db,
            rx,
            depth.clone(),
            state.clone(),
            stats.clone(),
        ));

        Self {
            tx: Some(tx),
            depth,
            state,
            stats,
            join,
            assigned: HashSet::new(),
            message_count: 0,
            above_count: 0,
        }
    }

    /// Attempts to enqueue a triple without blocking.
    ///
    /// Returns the triple back when the queue is full or the writer no
    /// longer accepts work.
    pub fn try_enqueue(&self, triple: QueryTriple) -> Result<(), QueryTriple> {
        let Some(tx) = &self.tx else {
            return Err(triple);
        };

        match tx.try_send(triple) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(t)) => Err(t),
            Err(mpsc::error::TrySendError::Closed(t)) => Err(t),
        }
    }

    /// Returns queued plus in-flight items.
    ///
    /// Zero means everything handed to this writer has been written (or
    /// dropped after exhausting retries) - the property pool drains wait
    /// on.
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> WriterState {
        WriterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Returns the shared statistics.
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Clears the routing bookkeeping after a drain.
    pub fn reset_routing(&mut self) {
        self.assigned.clear();
        self.above_count = 0;
        self.message_count = 0;
    }

    /// Begins shutdown: stops accepting work and lets the task finish
    /// its queue.
    pub fn begin_shutdown(&mut self) {
        self.state
            .store(WriterState::Draining as u8, Ordering::SeqCst);
        // Dropping the sender closes the channel; the task exits once
        // the queue is empty.
        self.tx = None;
    }

    /// Waits for the task to exit, sleeping in small steps.
    ///
    /// Returns `false` if the deadline passed first.
    pub fn join_blocking(&self, deadline: Duration) -> bool {
        let start = std::time::Instant::now();
        while !self.join.is_finished() {
            if start.elapsed() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("assigned", &self.assigned.len())
            .field("message_count", &self.message_count)
            .field("above_count", &self.above_count)
            .finish()
    }
}

// =============================================================================
// Writer Task
// =============================================================================

async fn run_writer(
    config: WriterConfig,
    db: Arc<dyn Database>,
    mut rx: mpsc::Receiver<QueryTriple>,
    depth: Arc<AtomicUsize>,
    state: Arc<AtomicU8>,
    stats: Arc<WriterStats>,
) {
    debug!(
        batch_records = config.batch_records,
        batch_ms = config.batch_time.as_millis() as u64,
        db = db.name(),
        "writer started"
    );

    loop {
        // Wait for the first item of the next batch.
        let first = match tokio::time::timeout(config.batch_time, rx.recv()).await {
            Ok(Some(triple)) => triple,
            Ok(None) => break, // channel closed and fully drained
            Err(_) => continue,
        };

        let mut batch = vec![first];
        let deadline = tokio::time::Instant::now() + config.batch_time;
        let mut closed = false;

        while batch.len() < config.batch_records {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(triple)) => batch.push(triple),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let batch_len = batch.len();
        write_batch(&*db, &config, batch, &stats).await;

        // Depth counts queued plus in-flight; release only after the
        // write, so an empty queue means the data reached the database.
        depth.fetch_sub(batch_len, Ordering::SeqCst);

        if closed {
            break;
        }
    }

    state.store(WriterState::Stopped as u8, Ordering::SeqCst);
    debug!("writer stopped");
}

/// Merges and ships one batch.
async fn write_batch(
    db: &dyn Database,
    config: &WriterConfig,
    batch: Vec<QueryTriple>,
    stats: &WriterStats,
) {
    let mut groups: Vec<QueryTriple> = Vec::new();

    for triple in batch {
        match groups.iter_mut().find(|g| g.same_statement(&triple)) {
            Some(group) => group.merge(triple),
            None => groups.push(triple),
        }
    }

    for group in groups {
        let tuples = group.len() as u64;
        let Some(sql) = group.to_sql() else { continue };

        trace!(tuples, sql_len = sql.len(), "writing batch");

        match db.update(&sql, config.db_retries).await {
            Ok(_) => {
                stats.batches_written.fetch_add(1, Ordering::Relaxed);
                stats.tuples_written.fetch_add(tuples, Ordering::Relaxed);
            }
            Err(e) => {
                // Dropped; the bus redelivers and the upsert absorbs it.
                stats.batches_failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, tuples, "batch dropped after database failure");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
