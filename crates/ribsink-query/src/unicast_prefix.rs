// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Unicast prefix upsert builder.
//!
//! Withdraws preserve the stored `base_attr_hash_id` and `origin_as`:
//! a withdrawn row keeps pointing at the last advertised path.

use ribsink_core::types::UnicastPrefixRec;

use crate::triple::{sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO unicast_rib \
    (hash_id,peer_hash_id,base_attr_hash_id,is_ipv4,origin_as,prefix,prefix_len,timestamp,\
    is_withdrawn,path_id,labels,is_pre_policy,is_adj_rib_in) VALUES ";

const SUFFIX: &str = " ON CONFLICT (peer_hash_id,hash_id) DO UPDATE SET \
    timestamp=excluded.timestamp,\
    base_attr_hash_id=CASE excluded.is_withdrawn WHEN true THEN unicast_rib.base_attr_hash_id \
    ELSE excluded.base_attr_hash_id END,\
    origin_as=CASE excluded.is_withdrawn WHEN true THEN unicast_rib.origin_as \
    ELSE excluded.origin_as END,\
    is_withdrawn=excluded.is_withdrawn,\
    path_id=excluded.path_id,labels=excluded.labels,\
    is_pre_policy=excluded.is_pre_policy,is_adj_rib_in=excluded.is_adj_rib_in";

/// Builds the `unicast_rib` bulk upsert.
#[derive(Debug)]
pub struct UnicastPrefixQuery {
    records: Vec<UnicastPrefixRec>,
}

impl UnicastPrefixQuery {
    /// Creates a builder over a decoded unicast prefix batch.
    pub fn new(records: Vec<UnicastPrefixRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by NLRI hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.peer_hash),
                sql_uuid(&rec.base_attr_hash),
                sql_bool(rec.is_ipv4),
                rec.origin_as.unwrap_or(0),
                sql_inet(&rec.prefix, rec.prefix_len),
                rec.prefix_len,
                sql_ts(&rec.timestamp),
                sql_bool(rec.is_withdrawn),
                rec.path_id,
                sql_str(&rec.labels),
                sql_bool(rec.is_pre_policy),
                sql_bool(rec.is_adj_rib_in),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }
}

/// Renders `prefix/len` as an inet literal.
pub(crate) fn sql_inet(prefix: &str, len: u8) -> String {
    format!("{}::inet", sql_str(&format!("{prefix}/{len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(hash: &str, withdrawn: bool) -> UnicastPrefixRec {
        UnicastPrefixRec {
            hash: hash.into(),
            peer_hash: "p1".into(),
            base_attr_hash: if withdrawn { String::new() } else { "a1".into() },
            is_ipv4: true,
            origin_as: if withdrawn { None } else { Some(64500) },
            prefix: "10.0.0.0".into(),
            prefix_len: 24,
            timestamp: "2025-06-01 10:00:00".into(),
            is_withdrawn: withdrawn,
            path_id: 0,
            labels: String::new(),
            is_pre_policy: true,
            is_adj_rib_in: true,
            as_path: Some("64512 64500".into()),
        }
    }

    #[test]
    fn test_announce_tuple() {
        let q = UnicastPrefixQuery::new(vec![prefix("x1", false)]);
        let t = q.triple();

        let tuple = &t.values["x1"];
        assert!(tuple.contains("'10.0.0.0/24'::inet"));
        assert!(tuple.contains("'a1'::uuid"));
        assert!(tuple.contains("64500"));
    }

    #[test]
    fn test_withdraw_preserves_attr_columns() {
        let q = UnicastPrefixQuery::new(vec![prefix("x1", true)]);
        let sql = q.triple().to_sql().unwrap();

        // Tuple carries null attr ref; the conflict clause keeps the old one.
        assert!(sql.contains("null::uuid"));
        assert!(sql.contains(
            "base_attr_hash_id=CASE excluded.is_withdrawn WHEN true THEN unicast_rib.base_attr_hash_id"
        ));
        assert!(sql.contains(
            "origin_as=CASE excluded.is_withdrawn WHEN true THEN unicast_rib.origin_as"
        ));
    }

    #[test]
    fn test_duplicate_hash_conflates_to_latest() {
        let announce = prefix("x1", false);
        let withdraw = prefix("x1", true);

        let q = UnicastPrefixQuery::new(vec![announce, withdraw]);
        let t = q.triple();

        assert_eq!(t.len(), 1);
        assert!(t.values["x1"].contains("true"));
    }
}
