// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Link-state prefix upsert builder.

use ribsink_core::types::LsPrefixRec;

use crate::triple::{sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};
use crate::unicast_prefix::sql_inet;

const PREFIX: &str = "INSERT INTO ls_prefixes \
    (hash_id,peer_hash_id,base_attr_hash_id,local_node_hash_id,prefix,prefix_len,metric,\
    protocol,timestamp,is_withdrawn) VALUES ";

const SUFFIX: &str = " ON CONFLICT (peer_hash_id,hash_id) DO UPDATE SET \
    timestamp=excluded.timestamp,\
    base_attr_hash_id=CASE excluded.is_withdrawn WHEN true THEN ls_prefixes.base_attr_hash_id \
    ELSE excluded.base_attr_hash_id END,\
    local_node_hash_id=excluded.local_node_hash_id,metric=excluded.metric,\
    protocol=excluded.protocol,is_withdrawn=excluded.is_withdrawn";

/// Builds the `ls_prefixes` bulk upsert.
#[derive(Debug)]
pub struct LsPrefixQuery {
    records: Vec<LsPrefixRec>,
}

impl LsPrefixQuery {
    /// Creates a builder over a decoded link-state prefix batch.
    pub fn new(records: Vec<LsPrefixRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by prefix hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.peer_hash),
                sql_uuid(&rec.base_attr_hash),
                sql_uuid(&rec.local_node_hash),
                sql_inet(&rec.prefix, rec.prefix_len),
                rec.prefix_len,
                rec.metric,
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
        let rec = LsPrefixRec {
            hash: "lp1".into(),
            peer_hash: "p1".into(),
            base_attr_hash: String::new(),
            local_node_hash: "n1".into(),
            prefix: "10.2.0.0".into(),
            prefix_len: 24,
            metric: 20,
            protocol: "ospf".into(),
            timestamp: "2025-06-01 10:00:00".into(),
            is_withdrawn: true,
        };

        let q = LsPrefixQuery::new(vec![rec]);
        let sql = q.triple().to_sql().unwrap();

        assert!(sql.starts_with("INSERT INTO ls_prefixes"));
        assert!(sql.contains("'10.2.0.0/24'::inet"));
        // Withdraw without an attr ref inserts null but the conflict
        // clause keeps the stored reference.
        assert!(sql.contains("null::uuid"));
        assert!(sql.contains("THEN ls_prefixes.base_attr_hash_id"));
    }
}
