// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # Writer Fleet Integration Tests
//!
//! Load-shaped scenarios over the pool: sticky key distribution across
//! multiple writers and per-key write ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ribsink_core::types::WriterType;
use ribsink_db::{Database, MockDatabase};
use ribsink_query::QueryTriple;
use ribsink_writer::{DbFactory, PoolConfig, WriterConfig, WriterPool};

fn make_pool(db: Arc<MockDatabase>, writers: usize) -> WriterPool {
    let db_for_factory = db.clone();
    let factory: DbFactory = Arc::new(move || db_for_factory.clone() as Arc<dyn Database>);

    let config = PoolConfig {
        writer: WriterConfig {
            queue_size: 256,
            batch_records: 50,
            batch_time: Duration::from_millis(10),
            db_retries: 1,
        },
        ..PoolConfig::for_testing()
    };

    let mut pool = WriterPool::new(
        WriterType::Default,
        config,
        tokio::runtime::Handle::current(),
        factory,
    );

    let mut heartbeat = || {};
    while pool.len() < writers {
        pool.add_writer(&mut heartbeat);
    }
    pool
}

/// One uniquely keyed statement per item so nothing conflates and the
/// executed order is observable per key.
fn seq_triple(key: &str, seq: usize) -> QueryTriple {
    let mut triple = QueryTriple::new(format!("INSERT {key} seq{seq:06} "), " SUF".to_string());
    triple
        .values
        .insert(format!("{key}/{seq}"), "(1)".to_string());
    triple
}

async fn send_until_accepted(pool: &mut WriterPool, key: &str, triple: QueryTriple) -> usize {
    let idx = pool.route(key);
    let mut item = triple;

    loop {
        match pool.try_send(idx, item) {
            Ok(()) => return idx,
            Err(back) => {
                item = back;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keys_disjoint_and_ordered_across_two_writers() {
    let db = Arc::new(MockDatabase::new());
    let mut pool = make_pool(db.clone(), 2);

    const KEYS: usize = 10;
    const PER_KEY: usize = 500;

    // Interleave keys the way a partition would deliver them.
    let mut owner: HashMap<String, usize> = HashMap::new();
    for seq in 0..PER_KEY {
        for k in 0..KEYS {
            let key = format!("k{k}");
            let idx = send_until_accepted(&mut pool, &key, seq_triple(&key, seq)).await;

            // Sticky invariant: every item for a key lands on one writer.
            match owner.get(&key) {
                Some(prev) => assert_eq!(*prev, idx, "key {key} moved writers"),
                None => {
                    owner.insert(key, idx);
                }
            }
        }
    }

    // Both writers got a share of the key space.
    let writers_used: std::collections::HashSet<usize> = owner.values().copied().collect();
    assert_eq!(writers_used.len(), 2, "keys did not spread across writers");

    // Drain everything to the database.
    let pool_done = tokio::task::spawn_blocking(move || {
        let mut heartbeat = || {};
        pool.shutdown(&mut heartbeat);
    });
    pool_done.await.unwrap();

    // Per-key order in the database matches arrival order.
    let mut seen: HashMap<String, i64> = HashMap::new();
    let mut rows = 0usize;
    for sql in db.executed() {
        let mut parts = sql.split_whitespace();
        let _insert = parts.next();
        let key = parts.next().expect("key tag").to_string();
        let seq: i64 = parts
            .next()
            .and_then(|s| s.strip_prefix("seq"))
            .and_then(|s| s.parse().ok())
            .expect("seq tag");

        let last = seen.entry(key.clone()).or_insert(-1);
        assert!(seq > *last, "key {key}: seq {seq} arrived after {}", *last);
        *last = seq;
        rows += 1;
    }

    assert_eq!(rows, KEYS * PER_KEY, "every item reached the database");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_writer_defers_without_loss() {
    let db = Arc::new(MockDatabase::new());
    let mut pool = make_pool(db.clone(), 1);

    // Push far more than one queue's worth through the retry loop.
    for seq in 0..1000usize {
        send_until_accepted(&mut pool, "k0", seq_triple("k0", seq)).await;
    }

    let pool_done = tokio::task::spawn_blocking(move || {
        let mut heartbeat = || {};
        pool.shutdown(&mut heartbeat);
    });
    pool_done.await.unwrap();

    assert_eq!(db.executed().len(), 1000);
}
