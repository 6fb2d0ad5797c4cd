// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Collector upsert builder.

use ribsink_core::types::CollectorRec;

use crate::triple::{sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO collectors \
    (hash_id,state,admin_id,routers,router_count,timestamp) VALUES ";

const SUFFIX: &str = " ON CONFLICT (hash_id) DO UPDATE SET \
    state=excluded.state,admin_id=excluded.admin_id,routers=excluded.routers,\
    router_count=excluded.router_count,timestamp=excluded.timestamp";

/// Builds the `collectors` bulk upsert and the router cascade update.
#[derive(Debug)]
pub struct CollectorQuery {
    records: Vec<CollectorRec>,
}

impl CollectorQuery {
    /// Creates a builder over a decoded collector batch.
    pub fn new(records: Vec<CollectorRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by collector hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let state = if rec.is_down() { "down" } else { "up" };

            let tuple = format!(
                "({},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_str(state),
                sql_str(&rec.admin_id),
                sql_str(&rec.routers),
                rec.router_count,
                sql_ts(&rec.timestamp),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }

    /// Cascade: a stopped collector takes its routers down.
    ///
    /// Returns `None` when no collector in the batch stopped.
    pub fn router_collector_update(&self) -> Option<String> {
        let stopped: Vec<&CollectorRec> =
            self.records.iter().filter(|r| r.is_down()).collect();

        let last = stopped.last()?;

        let hashes = stopped
            .iter()
            .map(|r| sql_uuid(&r.hash))
            .collect::<Vec<_>>()
            .join(",");

        Some(format!(
            "UPDATE routers SET state = 'down', timestamp = {} \
             WHERE state = 'up' AND collector_hash_id IN ({})",
            sql_ts(&last.timestamp),
            hashes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(action: &str, hash: &str) -> CollectorRec {
        CollectorRec {
            action: action.into(),
            hash: hash.into(),
            admin_id: "collector-a".into(),
            routers: "r1 r2".into(),
            router_count: 2,
            timestamp: "2025-06-01 10:00:00".into(),
        }
    }

    #[test]
    fn test_triple_keys_and_state() {
        let q = CollectorQuery::new(vec![collector("started", "c1"), collector("stopped", "c2")]);
        let t = q.triple();

        assert_eq!(t.len(), 2);
        assert!(t.values["c1"].contains("'up'"));
        assert!(t.values["c2"].contains("'down'"));
        assert!(t.to_sql().unwrap().starts_with("INSERT INTO collectors"));
    }

    #[test]
    fn test_router_cascade_only_on_stop() {
        let q = CollectorQuery::new(vec![collector("heartbeat", "c1")]);
        assert!(q.router_collector_update().is_none());

        let q = CollectorQuery::new(vec![collector("stopped", "c1")]);
        let sql = q.router_collector_update().unwrap();
        assert!(sql.contains("UPDATE routers SET state = 'down'"));
        assert!(sql.contains("'c1'::uuid"));
    }
}
