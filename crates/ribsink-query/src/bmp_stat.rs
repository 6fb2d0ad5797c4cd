// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! BMP statistics insert builder.
//!
//! Stats rows are a time series keyed by `(peer_hash_id, timestamp)`;
//! a redelivered report is simply ignored.

use ribsink_core::types::BmpStatRec;

use crate::triple::{sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO bmp_stats \
    (peer_hash_id,router_hash_id,rejected,known_dup_prefixes,known_dup_withdraws,\
    invalid_cluster_list,invalid_as_path,invalid_originator,routes_pre_policy,\
    routes_post_policy,timestamp) VALUES ";

const SUFFIX: &str = " ON CONFLICT (peer_hash_id,timestamp) DO NOTHING";

/// Builds the `bmp_stats` bulk insert.
#[derive(Debug)]
pub struct BmpStatQuery {
    records: Vec<BmpStatRec>,
}

impl BmpStatQuery {
    /// Creates a builder over a decoded stats batch.
    pub fn new(records: Vec<BmpStatRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk insert triple, keyed by peer hash and timestamp.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.peer_hash),
                sql_uuid(&rec.router_hash),
                rec.rejected,
                rec.known_dup_prefixes,
                rec.known_dup_withdraws,
                rec.invalid_cluster_list,
                rec.invalid_as_path,
                rec.invalid_originator,
                rec.routes_pre_policy,
                rec.routes_post_policy,
                sql_ts(&rec.timestamp),
            );

            let key = format!("{}/{}", rec.peer_hash, rec.timestamp);
            triple.values.insert(key, tuple);
        }

        triple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(peer: &str, ts: &str) -> BmpStatRec {
        BmpStatRec {
            peer_hash: peer.into(),
            router_hash: "r1".into(),
            rejected: 1,
            known_dup_prefixes: 2,
            known_dup_withdraws: 3,
            invalid_cluster_list: 0,
            invalid_as_path: 0,
            invalid_originator: 0,
            routes_pre_policy: 1000,
            routes_post_policy: 900,
            timestamp: ts.into(),
        }
    }

    #[test]
    fn test_key_is_peer_and_timestamp() {
        let q = BmpStatQuery::new(vec![
            stat("p1", "2025-06-01 10:00:00"),
            stat("p1", "2025-06-01 10:01:00"),
        ]);
        let t = q.triple();

        // Same peer, different report times: both kept.
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_redelivery_conflates() {
        let q = BmpStatQuery::new(vec![
            stat("p1", "2025-06-01 10:00:00"),
            stat("p1", "2025-06-01 10:00:00"),
        ]);
        assert_eq!(q.triple().len(), 1);
        assert!(q.triple().to_sql().unwrap().ends_with("DO NOTHING"));
    }
}
