// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Link-state link upsert builder.

use ribsink_core::types::LsLinkRec;

use crate::triple::{sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO ls_links \
    (hash_id,peer_hash_id,base_attr_hash_id,local_node_hash_id,remote_node_hash_id,\
    interface_ip,neighbor_ip,mt_id,igp_metric,protocol,timestamp,is_withdrawn) VALUES ";

const SUFFIX: &str = " ON CONFLICT (peer_hash_id,hash_id) DO UPDATE SET \
    timestamp=excluded.timestamp,\
    base_attr_hash_id=CASE excluded.is_withdrawn WHEN true THEN ls_links.base_attr_hash_id \
    ELSE excluded.base_attr_hash_id END,\
    local_node_hash_id=excluded.local_node_hash_id,\
    remote_node_hash_id=excluded.remote_node_hash_id,\
    interface_ip=excluded.interface_ip,neighbor_ip=excluded.neighbor_ip,\
    mt_id=excluded.mt_id,igp_metric=excluded.igp_metric,protocol=excluded.protocol,\
    is_withdrawn=excluded.is_withdrawn";

/// Builds the `ls_links` bulk upsert.
#[derive(Debug)]
pub struct LsLinkQuery {
    records: Vec<LsLinkRec>,
}

impl LsLinkQuery {
    /// Creates a builder over a decoded link-state link batch.
    pub fn new(records: Vec<LsLinkRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by link hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.peer_hash),
                sql_uuid(&rec.base_attr_hash),
                sql_uuid(&rec.local_node_hash),
                sql_uuid(&rec.remote_node_hash),
                sql_str(&rec.interface_ip),
                sql_str(&rec.neighbor_ip),
                rec.mt_id,
                rec.igp_metric,
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
        let rec = LsLinkRec {
            hash: "l1".into(),
            peer_hash: "p1".into(),
            base_attr_hash: "a1".into(),
            local_node_hash: "n1".into(),
            remote_node_hash: "n2".into(),
            interface_ip: "10.0.0.1".into(),
            neighbor_ip: "10.0.0.2".into(),
            mt_id: 0,
            igp_metric: 10,
            protocol: "isis".into(),
            timestamp: "2025-06-01 10:00:00".into(),
            is_withdrawn: false,
        };

        let q = LsLinkQuery::new(vec![rec]);
        let sql = q.triple().to_sql().unwrap();

        assert!(sql.starts_with("INSERT INTO ls_links"));
        assert!(sql.contains("'n1'::uuid"));
        assert!(sql.contains("'n2'::uuid"));
        assert!(sql.contains("THEN ls_links.base_attr_hash_id"));
    }
}
