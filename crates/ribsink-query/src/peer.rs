// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Peer upsert builder.

use ribsink_core::types::PeerRec;

use crate::triple::{sql_bool, sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO peers \
    (hash_id,router_hash_id,name,remote_bgp_id,remote_asn,remote_ip,local_asn,local_ip,\
    state,is_l3vpn,is_pre_policy,is_ipv4,timestamp) VALUES ";

const SUFFIX: &str = " ON CONFLICT (hash_id) DO UPDATE SET \
    name=excluded.name,remote_bgp_id=excluded.remote_bgp_id,remote_asn=excluded.remote_asn,\
    remote_ip=excluded.remote_ip,local_asn=excluded.local_asn,local_ip=excluded.local_ip,\
    state=excluded.state,is_l3vpn=excluded.is_l3vpn,is_pre_policy=excluded.is_pre_policy,\
    is_ipv4=excluded.is_ipv4,timestamp=excluded.timestamp";

/// RIB tables that carry per-peer entries.
const RIB_TABLES: [&str; 5] = ["unicast_rib", "l3vpn_rib", "ls_nodes", "ls_links", "ls_prefixes"];

/// Builds the `peers` bulk upsert and the RIB cascade updates.
#[derive(Debug)]
pub struct PeerQuery {
    records: Vec<PeerRec>,
}

impl PeerQuery {
    /// Creates a builder over a decoded peer batch.
    pub fn new(records: Vec<PeerRec>) -> Self {
        Self { records }
    }

    /// Produces the bulk upsert triple, keyed by peer hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_uuid(&rec.router_hash),
                sql_str(&rec.name),
                sql_str(&rec.remote_bgp_id),
                rec.remote_asn,
                sql_str(&rec.remote_ip),
                rec.local_asn,
                sql_str(&rec.local_ip),
                sql_str(rec.state.as_str()),
                sql_bool(rec.is_l3vpn),
                sql_bool(rec.is_pre_policy),
                sql_bool(rec.is_ipv4),
                sql_ts(&rec.timestamp),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }

    /// Cascade: a peer that went down has its RIB entries marked
    /// withdrawn, one statement per RIB table.
    pub fn rib_peer_updates(&self) -> Vec<String> {
        let downed: Vec<&PeerRec> =
            self.records.iter().filter(|p| !p.state.is_up()).collect();

        if downed.is_empty() {
            return Vec::new();
        }

        let hashes = downed
            .iter()
            .map(|p| sql_uuid(&p.hash))
            .collect::<Vec<_>>()
            .join(",");

        RIB_TABLES
            .iter()
            .map(|table| {
                format!(
                    "UPDATE {table} SET is_withdrawn = true \
                     WHERE is_withdrawn = false AND peer_hash_id IN ({hashes})"
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ribsink_core::types::EntityState;

    fn peer(hash: &str, state: EntityState) -> PeerRec {
        PeerRec {
            hash: hash.into(),
            router_hash: "r1".into(),
            name: "peer1".into(),
            remote_bgp_id: "203.0.113.1".into(),
            remote_asn: 64500,
            remote_ip: "203.0.113.1".into(),
            local_asn: 64501,
            local_ip: "203.0.113.2".into(),
            state,
            is_l3vpn: false,
            is_pre_policy: true,
            is_ipv4: true,
            timestamp: "2025-06-01 10:00:00".into(),
        }
    }

    #[test]
    fn test_triple_shape() {
        let q = PeerQuery::new(vec![peer("p1", EntityState::Up)]);
        let t = q.triple();
        assert_eq!(t.len(), 1);
        assert!(t.values["p1"].contains("64500"));
        assert!(t.to_sql().unwrap().contains("ON CONFLICT (hash_id)"));
    }

    #[test]
    fn test_rib_cascade_covers_all_tables() {
        let q = PeerQuery::new(vec![peer("p1", EntityState::Down)]);
        let sqls = q.rib_peer_updates();

        assert_eq!(sqls.len(), 5);
        assert!(sqls[0].contains("unicast_rib"));
        assert!(sqls[1].contains("l3vpn_rib"));
        assert!(sqls.iter().all(|s| s.contains("'p1'::uuid")));
        assert!(sqls.iter().all(|s| s.contains("is_withdrawn = true")));
    }

    #[test]
    fn test_up_peer_produces_no_cascade() {
        let q = PeerQuery::new(vec![peer("p1", EntityState::Up)]);
        assert!(q.rib_peer_updates().is_empty());
    }

    #[test]
    fn test_cascade_merges_downed_peers() {
        let q = PeerQuery::new(vec![peer("p1", EntityState::Down), peer("p2", EntityState::Down)]);
        let sqls = q.rib_peer_updates();
        assert_eq!(sqls.len(), 5);
        assert!(sqls[0].contains("'p1'::uuid"));
        assert!(sqls[0].contains("'p2'::uuid"));
    }
}
