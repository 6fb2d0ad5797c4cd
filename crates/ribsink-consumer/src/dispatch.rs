// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Record dispatch: the engine's brain, separated from the bus client.
//!
//! [`Dispatcher`] owns everything downstream of the Kafka consumer: the
//! decode step, the synchronous inventory path (collectors, routers,
//! peers - applied to the database before returning, so dependent NLRI
//! writes always find committed state), the dedup filter, the bounded
//! intake queue and the writer pools.
//!
//! The bus client stays outside: wherever the dispatcher has to wait
//! (intake full, pool drains), it invokes the caller-supplied heartbeat
//! callback so the engine can issue zero-duration polls and keep its
//! group membership alive. This seam is also what makes the whole
//! dispatch path testable without a broker.
//!
//! No error escapes a record: database failures on the synchronous path
//! and malformed payloads are logged and the record dropped, matching
//! the at-least-once contract.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use ribsink_core::cache::{AttrDedupCache, RouterCache};
use ribsink_core::envelope::{decode_envelope, RecordBatch};
use ribsink_core::subscriptions::SubscriptionTable;
use ribsink_core::types::{RecordKind, WriterType};
use ribsink_db::Database;
use ribsink_query::{
    BaseAttrQuery, BmpStatQuery, CollectorQuery, L3VpnPrefixQuery, LsLinkQuery, LsNodeQuery,
    LsPrefixQuery, PeerQuery, QueryTriple, RouterQuery, UnicastPrefixQuery,
};
use ribsink_writer::WriterPool;

use crate::notify::{fan_out, NotificationSink};

/// Interval between writer-pool samples and attr-cache purges.
const WRITER_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Stalled-drain tolerance during shutdown: this many unchanged samples,
/// 100 ms apart, declare the intake stuck.
const SHUTDOWN_STALL_LIMIT: u32 = 500;

// =============================================================================
// Configuration
// =============================================================================

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Intake queue capacity.
    pub intake_size: usize,
    /// Retry budget for synchronous inventory statements.
    pub db_retries: u32,
    /// Subscription TTL in seconds.
    pub subscription_timeout_seconds: u64,
    /// Base-attribute dedup entry age in milliseconds.
    pub attr_cache_age_millis: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            intake_size: 10_000,
            db_retries: 10,
            subscription_timeout_seconds: 3600,
            attr_cache_age_millis: 1_200_000,
        }
    }
}

// =============================================================================
// Intake Item
// =============================================================================

/// One routed unit of bulk work.
#[derive(Debug)]
pub struct IntakeItem {
    /// Bus record key; drives sticky routing.
    pub key: String,
    /// Destination pool.
    pub writer_type: WriterType,
    /// The bulk statement fragment.
    pub triple: QueryTriple,
}

// =============================================================================
// Engine Statistics
// =============================================================================

/// Counters shared between the engine thread and the stats logger.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Total bus records seen.
    pub messages: AtomicU64,
    /// Per-topic record counts.
    pub collector: AtomicU64,
    /// Router records.
    pub router: AtomicU64,
    /// Peer records.
    pub peer: AtomicU64,
    /// Base attribute records.
    pub base_attribute: AtomicU64,
    /// Unicast prefix records.
    pub unicast_prefix: AtomicU64,
    /// L3VPN prefix records.
    pub l3vpn_prefix: AtomicU64,
    /// Link-state node records.
    pub ls_node: AtomicU64,
    /// Link-state link records.
    pub ls_link: AtomicU64,
    /// Link-state prefix records.
    pub ls_prefix: AtomicU64,
    /// BMP stat records.
    pub bmp_stat: AtomicU64,
    /// Subscription records.
    pub subscription: AtomicU64,
    /// Records dropped by the decoder.
    pub decode_failures: AtomicU64,
    /// Current intake queue depth.
    pub intake_depth: AtomicUsize,
    /// Epoch ms of the last collector message, 0 if none yet.
    pub last_collector_msg_ms: AtomicI64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    /// Total bus records seen.
    pub messages: u64,
    /// Per-topic counts keyed by kind name.
    pub by_topic: HashMap<String, u64>,
    /// Records dropped by the decoder.
    pub decode_failures: u64,
    /// Current intake queue depth.
    pub intake_depth: usize,
    /// Epoch ms of the last collector message.
    pub last_collector_msg_ms: i64,
}

impl EngineStats {
    fn bump(&self, kind: RecordKind) {
        let counter = match kind {
            RecordKind::Collector => &self.collector,
            RecordKind::Router => &self.router,
            RecordKind::Peer => &self.peer,
            RecordKind::BaseAttribute => &self.base_attribute,
            RecordKind::UnicastPrefix => &self.unicast_prefix,
            RecordKind::L3VpnPrefix => &self.l3vpn_prefix,
            RecordKind::LsNode => &self.ls_node,
            RecordKind::LsLink => &self.ls_link,
            RecordKind::LsPrefix => &self.ls_prefix,
            RecordKind::BmpStat => &self.bmp_stat,
            RecordKind::Subscription => &self.subscription,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot for logging.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        let mut by_topic = HashMap::new();
        for (name, counter) in [
            ("collector", &self.collector),
            ("router", &self.router),
            ("peer", &self.peer),
            ("base_attribute", &self.base_attribute),
            ("unicast_prefix", &self.unicast_prefix),
            ("l3vpn", &self.l3vpn_prefix),
            ("ls_node", &self.ls_node),
            ("ls_link", &self.ls_link),
            ("ls_prefix", &self.ls_prefix),
            ("bmp_stat", &self.bmp_stat),
            ("subscription", &self.subscription),
        ] {
            by_topic.insert(name.to_string(), counter.load(Ordering::Relaxed));
        }

        EngineStatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            by_topic,
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            intake_depth: self.intake_depth.load(Ordering::Relaxed),
            last_collector_msg_ms: self.last_collector_msg_ms.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Everything downstream of the bus client.
pub struct Dispatcher {
    config: DispatchConfig,
    db: Arc<dyn Database>,
    pools: HashMap<WriterType, WriterPool>,
    router_cache: RouterCache,
    attr_cache: AttrDedupCache,
    subscriptions: SubscriptionTable,
    notifier: Arc<dyn NotificationSink>,
    intake: VecDeque<IntakeItem>,
    stats: Arc<EngineStats>,
    last_writer_check: Instant,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// `db` is the engine's own handle for the synchronous inventory
    /// path; the pools carry their own handles.
    pub fn new(
        config: DispatchConfig,
        db: Arc<dyn Database>,
        pools: HashMap<WriterType, WriterPool>,
        subscriptions: SubscriptionTable,
        notifier: Arc<dyn NotificationSink>,
        stats: Arc<EngineStats>,
    ) -> Self {
        let attr_cache = AttrDedupCache::new(config.attr_cache_age_millis);

        Self {
            config,
            db,
            pools,
            router_cache: RouterCache::new(),
            attr_cache,
            subscriptions,
            notifier,
            intake: VecDeque::new(),
            stats,
            last_writer_check: Instant::now(),
        }
    }

    /// Returns the shared stats.
    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    /// Returns the intake depth.
    pub fn intake_len(&self) -> usize {
        self.intake.len()
    }

    /// Returns `true` once any pool drain has blown its deadline.
    pub fn drain_failed(&self) -> bool {
        self.pools.values().any(WriterPool::drain_failed)
    }

    /// Returns per-pool writer snapshots for stats logging.
    pub fn pool_snapshots(&self) -> HashMap<WriterType, Vec<ribsink_writer::WriterSnapshot>> {
        self.pools
            .iter()
            .map(|(t, p)| (*t, p.snapshot()))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Record handling
    // -------------------------------------------------------------------------

    /// Handles one bus record. Never fails: decode and database problems
    /// are logged and the record dropped.
    pub async fn handle_record(
        &mut self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        heartbeat: &mut dyn FnMut(),
    ) {
        self.stats.messages.fetch_add(1, Ordering::Relaxed);

        let decoded = match decode_envelope(topic, payload) {
            Ok(d) => d,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                debug!(topic, error = %e, "dropping undecodable record");
                return;
            }
        };

        self.stats.bump(decoded.kind);
        trace!(topic, kind = %decoded.kind, records = decoded.batch.len(), "dispatching");

        let key = key.unwrap_or_default().to_string();
        let collector_hash = decoded.collector_hash;

        match decoded.batch {
            RecordBatch::Collector(records) => {
                self.handle_collector(records, heartbeat).await;
            }
            RecordBatch::Router(records) => {
                self.handle_router(collector_hash, records, heartbeat).await;
            }
            RecordBatch::Peer(records) => {
                self.handle_peer(records, heartbeat).await;
            }
            RecordBatch::BaseAttribute(records) => {
                let now = Utc::now().timestamp_millis();
                let fresh: Vec<_> = records
                    .into_iter()
                    .filter(|r| self.attr_cache.observe(&r.hash, now))
                    .collect();

                if !fresh.is_empty() {
                    let triple = BaseAttrQuery::new(fresh).triple();
                    self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                        .await;
                }
            }
            RecordBatch::UnicastPrefix(records) => {
                fan_out(&*self.notifier, &records, &self.subscriptions);

                let triple = UnicastPrefixQuery::new(records).triple();
                self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                    .await;
            }
            RecordBatch::L3VpnPrefix(records) => {
                let triple = L3VpnPrefixQuery::new(records).triple();
                self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                    .await;
            }
            RecordBatch::LsNode(records) => {
                let triple = LsNodeQuery::new(records).triple();
                self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                    .await;
            }
            RecordBatch::LsLink(records) => {
                let triple = LsLinkQuery::new(records).triple();
                self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                    .await;
            }
            RecordBatch::LsPrefix(records) => {
                let triple = LsPrefixQuery::new(records).triple();
                self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                    .await;
            }
            RecordBatch::BmpStat(records) => {
                let triple = BmpStatQuery::new(records).triple();
                self.enqueue_bulk(key, WriterType::Default, triple, heartbeat)
                    .await;
            }
            RecordBatch::Subscription(records) => {
                for rec in records {
                    if rec.action == "subscribe" {
                        let expiration = self
                            .subscriptions
                            .subscribe(&rec.resource, self.config.subscription_timeout_seconds);
                        info!(
                            resource = %rec.resource,
                            expiration_ms = expiration,
                            "subscription created/refreshed"
                        );
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Inventory path (synchronous)
    // -------------------------------------------------------------------------

    async fn handle_collector(
        &mut self,
        records: Vec<ribsink_core::types::CollectorRec>,
        heartbeat: &mut dyn FnMut(),
    ) {
        let query = CollectorQuery::new(records);

        if let Some(sql) = query.triple().to_sql() {
            self.sync_update(&sql).await;
        }

        if let Some(sql) = query.router_collector_update() {
            debug!(sql = %sql, "collector cascade");
            self.sync_update(&sql).await;
        }

        heartbeat();
        self.stats
            .last_collector_msg_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    async fn handle_router(
        &mut self,
        collector_hash: Option<String>,
        records: Vec<ribsink_core::types::RouterRec>,
        heartbeat: &mut dyn FnMut(),
    ) {
        let query = RouterQuery::new(collector_hash, records);

        if let Some(sql) = query.triple().to_sql() {
            self.sync_update(&sql).await;
        }

        heartbeat();

        // The cascade consults the cache as committed before this batch:
        // up_count still includes the connection that just went down.
        if let Some(sql) = query.peer_router_update(&self.router_cache) {
            debug!(sql = %sql, "router cascade");
            self.sync_update(&sql).await;
        }

        self.refresh_router_cache().await;
    }

    async fn handle_peer(
        &mut self,
        records: Vec<ribsink_core::types::PeerRec>,
        heartbeat: &mut dyn FnMut(),
    ) {
        let query = PeerQuery::new(records);

        if let Some(sql) = query.triple().to_sql() {
            self.sync_update(&sql).await;
        }

        heartbeat();

        for sql in query.rib_peer_updates() {
            debug!(sql = %sql, "peer cascade");
            self.sync_update(&sql).await;
            heartbeat();
        }
    }

    async fn sync_update(&self, sql: &str) {
        if let Err(e) = self.db.update(sql, self.config.db_retries).await {
            warn!(error = %e, "inventory statement dropped");
        }
    }

    /// Rebuilds the router cache from the database.
    pub async fn refresh_router_cache(&mut self) {
        match self
            .db
            .select("SELECT name, hash_id::text AS hash_id, state FROM routers")
            .await
        {
            Ok(rows) => {
                self.router_cache.rebuild(&rows);
                debug!(routers = self.router_cache.len(), "router cache refreshed");
            }
            Err(e) => warn!(error = %e, "router cache refresh failed"),
        }
    }

    // -------------------------------------------------------------------------
    // Intake and writer dispatch
    // -------------------------------------------------------------------------

    /// Enqueues a bulk triple, applying backpressure when the intake is
    /// full: heartbeat, drain a pass to the writers, sleep, retry.
    async fn enqueue_bulk(
        &mut self,
        key: String,
        writer_type: WriterType,
        triple: QueryTriple,
        heartbeat: &mut dyn FnMut(),
    ) {
        if triple.is_empty() {
            return;
        }

        while self.intake.len() >= self.config.intake_size {
            heartbeat();
            self.write_pending();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        self.intake.push_back(IntakeItem {
            key,
            writer_type,
            triple,
        });
        self.stats
            .intake_depth
            .store(self.intake.len(), Ordering::Relaxed);
    }

    /// Routes queued intake items to writers.
    ///
    /// Items whose writer queue is full go back to the intake tail and
    /// that writer is skipped for the rest of the pass, so a stalled
    /// writer cannot reorder its own keys within the pass.
    pub fn write_pending(&mut self) {
        let mut busy: HashSet<(WriterType, usize)> = HashSet::new();
        let passes = self.intake.len();

        for _ in 0..passes {
            let Some(item) = self.intake.pop_front() else {
                break;
            };

            let Some(pool) = self.pools.get_mut(&item.writer_type) else {
                warn!(writer_type = %item.writer_type, "no pool for writer type, dropping");
                continue;
            };

            let idx = pool.route(&item.key);

            if busy.contains(&(item.writer_type, idx)) {
                self.intake.push_back(item);
                continue;
            }

            if let Err(triple) = pool.try_send(idx, item.triple) {
                busy.insert((item.writer_type, idx));
                self.intake.push_back(IntakeItem {
                    key: item.key,
                    writer_type: item.writer_type,
                    triple,
                });
            }
        }

        self.stats
            .intake_depth
            .store(self.intake.len(), Ordering::Relaxed);
    }

    /// Ten-second housekeeping: purge the dedup cache and sample the
    /// pools for rebalance/scaling.
    pub fn periodic_writer_check(&mut self, heartbeat: &mut dyn FnMut()) {
        if self.last_writer_check.elapsed() < WRITER_CHECK_INTERVAL {
            return;
        }
        self.last_writer_check = Instant::now();

        let purged = self.attr_cache.purge(Utc::now().timestamp_millis());
        info!(
            purged,
            cached = self.attr_cache.len(),
            "purged attribute dedup cache"
        );

        for (writer_type, pool) in self.pools.iter() {
            for (idx, snap) in pool.snapshot().iter().enumerate() {
                debug!(
                    pool = %writer_type,
                    writer = idx,
                    assigned = snap.assigned,
                    queue = snap.queue,
                    above_count = snap.above_count,
                    messages = snap.message_count,
                    "writer status"
                );
            }
        }

        for pool in self.pools.values_mut() {
            pool.check(heartbeat);
        }
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Drains the intake and stops the writer fleet.
    ///
    /// The intake drain tolerates a bounded stall: if the queue depth
    /// stops changing for [`SHUTDOWN_STALL_LIMIT`] samples the drain is
    /// abandoned and whatever remains is dropped (the bus redelivers).
    pub async fn shutdown(&mut self, heartbeat: &mut dyn FnMut()) {
        info!(intake = self.intake.len(), "draining intake queue");

        let mut prev = self.intake.len();
        let mut stalled: u32 = 0;
        let mut logged: u32 = 0;

        while !self.intake.is_empty() && stalled < SHUTDOWN_STALL_LIMIT {
            if prev != self.intake.len() {
                stalled = 0;
            } else {
                stalled += 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            prev = self.intake.len();

            self.write_pending();
            heartbeat();

            logged += 1;
            if logged > 100 {
                logged = 0;
                info!(
                    intake = self.intake.len(),
                    stalled, "still draining intake queue"
                );
            }
        }

        if !self.intake.is_empty() {
            warn!(
                remaining = self.intake.len(),
                "intake drain stalled, dropping remaining items"
            );
            self.intake.clear();
        }

        for pool in self.pools.values_mut() {
            pool.shutdown(heartbeat);
        }

        self.notifier.close();
        self.db.disconnect().await;

        info!("dispatcher shutdown complete");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("intake", &self.intake.len())
            .field("pools", &self.pools.len())
            .field("routers_cached", &self.router_cache.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use ribsink_db::MockDatabase;
    use ribsink_writer::PoolConfig;

    fn make_dispatcher(db: Arc<MockDatabase>) -> Dispatcher {
        let db_for_factory = db.clone();
        let factory: ribsink_writer::pool::DbFactory =
            Arc::new(move || db_for_factory.clone() as Arc<dyn Database>);

        let mut pools = HashMap::new();
        for t in WriterType::ALL {
            pools.insert(
                t,
                WriterPool::new(
                    t,
                    PoolConfig::for_testing(),
                    tokio::runtime::Handle::current(),
                    factory.clone(),
                ),
            );
        }

        Dispatcher::new(
            DispatchConfig {
                intake_size: 100,
                db_retries: 1,
                subscription_timeout_seconds: 60,
                attr_cache_age_millis: 1_200_000,
            },
            db,
            pools,
            SubscriptionTable::new(),
            Arc::new(MemoryNotifier::new()),
            Arc::new(EngineStats::default()),
        )
    }

    fn nop() -> impl FnMut() {
        || {}
    }

    fn router_payload(hash: &str, state: &str) -> Vec<u8> {
        format!(
            r#"{{"records":[{{"hash":"{hash}","name":"edge1","ip_address":"192.0.2.1",
                "state":"{state}","timestamp":"2025-06-01 10:00:00"}}]}}"#
        )
        .into_bytes()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_router_upserted_synchronously() {
        let db = Arc::new(MockDatabase::new());
        let mut d = make_dispatcher(db.clone());
        let mut hb = nop();

        d.handle_record(
            "bgpdata.parsed.router",
            Some("r1"),
            &router_payload("r1", "up"),
            &mut hb,
        )
        .await;

        // Upsert lands before handle_record returns.
        let executed = db.executed();
        assert!(executed.iter().any(|s| s.starts_with("INSERT INTO routers")));
        // And the cache was refreshed from the committed state.
        assert_eq!(db.select_count(), 1);

        d.shutdown(&mut hb).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_attr_dedup_suppresses_rewrite() {
        let db = Arc::new(MockDatabase::new());
        let mut d = make_dispatcher(db.clone());
        let mut hb = nop();

        let payload = br#"{"records":[{
            "hash":"a1","peer_hash":"p1","origin":"igp","next_hop":"10.0.0.1",
            "timestamp":"2025-06-01 10:00:00"}]}"#;

        for _ in 0..100 {
            d.handle_record("bgpdata.parsed.base_attribute", Some("p1"), payload, &mut hb)
                .await;
        }

        d.write_pending();
        d.shutdown(&mut hb).await;

        // Exactly one insert; 99 suppressed by the dedup cache.
        let attr_inserts = db
            .executed()
            .iter()
            .filter(|s| s.starts_with("INSERT INTO base_attrs"))
            .count();
        assert_eq!(attr_inserts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_undecodable_record_dropped() {
        let db = Arc::new(MockDatabase::new());
        let mut d = make_dispatcher(db.clone());
        let mut hb = nop();

        d.handle_record("bgpdata.parsed.router", None, b"garbage", &mut hb)
            .await;
        d.handle_record("bgpdata.parsed.unknown_thing", None, b"{\"records\":[]}", &mut hb)
            .await;

        assert_eq!(d.stats.decode_failures.load(Ordering::Relaxed), 2);
        assert_eq!(db.update_count(), 0);

        d.shutdown(&mut hb).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscription_record_populates_table() {
        let db = Arc::new(MockDatabase::new());
        let mut d = make_dispatcher(db.clone());
        let mut hb = nop();

        let payload = br#"{"records":[{"action":"subscribe","resource":"AS65000"}]}"#;
        d.handle_record("bgpdata.parsed.subscription", None, payload, &mut hb)
            .await;

        assert!(d.subscriptions.contains("AS65000"));

        // Non-subscribe actions are ignored.
        let payload = br#"{"records":[{"action":"unsubscribe","resource":"AS65001"}]}"#;
        d.handle_record("bgpdata.parsed.subscription", None, payload, &mut hb)
            .await;
        assert!(!d.subscriptions.contains("AS65001"));

        d.shutdown(&mut hb).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prefix_flows_to_writer() {
        let db = Arc::new(MockDatabase::new());
        let mut d = make_dispatcher(db.clone());
        let mut hb = nop();

        let payload = br#"{"records":[{
            "hash":"x1","peer_hash":"p1","base_attr_hash":"a1","origin_as":64500,
            "prefix":"10.0.0.0","prefix_len":24,
            "timestamp":"2025-06-01 10:00:00"}]}"#;

        d.handle_record("bgpdata.parsed.unicast_prefix", Some("p1"), payload, &mut hb)
            .await;

        assert_eq!(d.intake_len(), 1);
        d.write_pending();
        assert_eq!(d.intake_len(), 0);

        d.shutdown(&mut hb).await;

        assert!(db
            .executed()
            .iter()
            .any(|s| s.starts_with("INSERT INTO unicast_rib")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_heartbeat_called_on_inventory_path() {
        let db = Arc::new(MockDatabase::new());
        let mut d = make_dispatcher(db.clone());

        let mut beats = 0u32;
        let mut hb = || beats += 1;

        // A peer going down walks all five RIB cascades with a heartbeat
        // between each.
        let payload = br#"{"records":[{
            "hash":"p1","router_hash":"r1","remote_bgp_id":"203.0.113.1",
            "remote_asn":64500,"remote_ip":"203.0.113.1","local_asn":64501,
            "local_ip":"203.0.113.2","state":"down",
            "timestamp":"2025-06-01 10:00:00"}]}"#;

        d.handle_record("bgpdata.parsed.peer", Some("p1"), payload, &mut hb)
            .await;

        assert!(beats >= 6, "expected heartbeats between cascades, got {beats}");

        let mut hb = nop();
        d.shutdown(&mut hb).await;
    }
}
