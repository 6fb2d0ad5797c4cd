// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Base attribute upsert builder.
//!
//! Attribute sets are content-addressed: the hash identifies the full
//! attribute tuple, so a conflicting insert only needs to refresh the
//! timestamp.

use ribsink_core::types::BaseAttrRec;

use crate::triple::{sql_array, sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO base_attrs \
    (hash_id,peer_hash_id,origin,as_path,as_path_count,origin_as,next_hop,med,local_pref,\
    aggregator,community_list,ext_community_list,large_community_list,is_atomic_agg,\
    is_nexthop_ipv4,timestamp) VALUES ";

const SUFFIX: &str =
    " ON CONFLICT (hash_id) DO UPDATE SET timestamp=excluded.timestamp";

/// Builds the `base_attrs` bulk upsert.
#[derive(Debug)]
pub struct BaseAttrQuery {
    records: Vec<BaseAttrRec>,
}

impl BaseAttrQuery {
    /// Creates a builder over a (dedup-filtered) base attribute batch.
    pub fn new(records: Vec<BaseAttrRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by attribute hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.peer_hash),
                sql_str(&rec.origin),
                sql_str(&rec.as_path),
                rec.as_path_count,
                rec.origin_as,
                sql_str(&rec.next_hop),
                rec.med,
                rec.local_pref,
                sql_str(&rec.aggregator),
                sql_array(&rec.community_list),
                sql_array(&rec.ext_community_list),
                sql_array(&rec.large_community_list),
                sql_bool(rec.is_atomic_agg),
                sql_bool(rec.is_nexthop_ipv4),
                sql_ts(&rec.timestamp),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(hash: &str) -> BaseAttrRec {
        BaseAttrRec {
            hash: hash.into(),
            peer_hash: "p1".into(),
            origin: "igp".into(),
            as_path: "64512 15169".into(),
            as_path_count: 2,
            origin_as: 15169,
            next_hop: "203.0.113.1".into(),
            med: 0,
            local_pref: 100,
            aggregator: String::new(),
            community_list: "64512:100".into(),
            ext_community_list: String::new(),
            large_community_list: String::new(),
            is_atomic_agg: false,
            is_nexthop_ipv4: true,
            timestamp: "2025-06-01 10:00:00".into(),
        }
    }

    #[test]
    fn test_triple_conflates_on_hash() {
        let q = BaseAttrQuery::new(vec![attr("a1"), attr("a1"), attr("a2")]);
        let t = q.triple();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_community_lists_are_arrays() {
        let q = BaseAttrQuery::new(vec![attr("a1")]);
        let sql = q.triple().to_sql().unwrap();
        assert!(sql.contains("array['64512:100']::varchar[]"));
        assert!(sql.contains("array[]::varchar[]"));
    }

    #[test]
    fn test_conflict_refreshes_timestamp_only() {
        let q = BaseAttrQuery::new(vec![attr("a1")]);
        let sql = q.triple().to_sql().unwrap();
        assert!(sql.ends_with("ON CONFLICT (hash_id) DO UPDATE SET timestamp=excluded.timestamp"));
    }
}
