// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! L3VPN prefix upsert builder.

use ribsink_core::types::L3VpnPrefixRec;

use crate::triple::{sql_array, sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};
use crate::unicast_prefix::sql_inet;

const PREFIX: &str = "INSERT INTO l3vpn_rib \
    (hash_id,peer_hash_id,base_attr_hash_id,is_ipv4,origin_as,prefix,prefix_len,timestamp,\
    is_withdrawn,path_id,labels,is_pre_policy,is_adj_rib_in,rd,ext_community_list) VALUES ";

const SUFFIX: &str = " ON CONFLICT (peer_hash_id,hash_id) DO UPDATE SET \
    timestamp=excluded.timestamp,\
    base_attr_hash_id=CASE excluded.is_withdrawn WHEN true THEN l3vpn_rib.base_attr_hash_id \
    ELSE excluded.base_attr_hash_id END,\
    origin_as=CASE excluded.is_withdrawn WHEN true THEN l3vpn_rib.origin_as \
    ELSE excluded.origin_as END,\
    is_withdrawn=excluded.is_withdrawn,\
    path_id=excluded.path_id,labels=excluded.labels,\
    is_pre_policy=excluded.is_pre_policy,is_adj_rib_in=excluded.is_adj_rib_in,\
    rd=excluded.rd,ext_community_list=excluded.ext_community_list";

/// Builds the `l3vpn_rib` bulk upsert.
#[derive(Debug)]
pub struct L3VpnPrefixQuery {
    records: Vec<L3VpnPrefixRec>,
}

impl L3VpnPrefixQuery {
    /// Creates a builder over a decoded L3VPN prefix batch.
    pub fn new(records: Vec<L3VpnPrefixRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by NLRI hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.peer_hash),
                sql_uuid(&rec.base_attr_hash),
                sql_bool(rec.is_ipv4),
                rec.origin_as,
                sql_inet(&rec.prefix, rec.prefix_len),
                rec.prefix_len,
                sql_ts(&rec.timestamp),
                sql_bool(rec.is_withdrawn),
                rec.path_id,
                sql_str(&rec.labels),
                sql_bool(rec.is_pre_policy),
                sql_bool(rec.is_adj_rib_in),
                sql_str(&rec.rd),
                sql_array(&rec.ext_community_list),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }
}
