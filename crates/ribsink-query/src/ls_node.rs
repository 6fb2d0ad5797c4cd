// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Link-state node upsert builder.

use ribsink_core::types::LsNodeRec;

use crate::triple::{sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO ls_nodes \
    (hash_id,peer_hash_id,base_attr_hash_id,asn,igp_router_id,router_id,name,flags,protocol,\
    timestamp,is_withdrawn) VALUES ";

const SUFFIX: &str = " ON CONFLICT (peer_hash_id,hash_id) DO UPDATE SET \
    timestamp=excluded.timestamp,\
    base_attr_hash_id=CASE excluded.is_withdrawn WHEN true THEN ls_nodes.base_attr_hash_id \
    ELSE excluded.base_attr_hash_id END,\
    asn=excluded.asn,igp_router_id=excluded.igp_router_id,router_id=excluded.router_id,\
    name=excluded.name,flags=excluded.flags,protocol=excluded.protocol,\
    is_withdrawn=excluded.is_withdrawn";

/// Builds the `ls_nodes` bulk upsert.
#[derive(Debug)]
pub struct LsNodeQuery {
    records: Vec<LsNodeRec>,
}

impl LsNodeQuery {
    /// Creates a builder over a decoded link-state node batch.
    pub fn new(records: Vec<LsNodeRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by node hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.peer_hash),
                sql_uuid(&rec.base_attr_hash),
                rec.asn,
                sql_str(&rec.igp_router_id),
                sql_str(&rec.router_id),
                sql_str(&rec.name),
                sql_str(&rec.flags),
                sql_str(&rec.protocol),
                sql_ts(&rec.timestamp),
                sql_bool(rec.is_withdrawn),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_shape() {
        let rec = LsNodeRec {
            hash: "n1".into(),
            peer_hash: "p1".into(),
            base_attr_hash: "a1".into(),
            asn: 64500,
            igp_router_id: "0000.0000.0001".into(),
            router_id: "192.0.2.1".into(),
            name: "core1".into(),
            flags: String::new(),
            protocol: "isis".into(),
            timestamp: "2025-06-01 10:00:00".into(),
            is_withdrawn: false,
        };

        let q = LsNodeQuery::new(vec![rec]);
        let sql = q.triple().to_sql().unwrap();

        assert!(sql.starts_with("INSERT INTO ls_nodes"));
        assert!(sql.contains("'isis'"));
        assert!(sql.contains("THEN ls_nodes.base_attr_hash_id"));
    }
}
