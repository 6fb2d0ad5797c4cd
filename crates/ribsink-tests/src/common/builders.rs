// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Record and envelope builders.
//!
//! Build decoded records with sensible defaults, or full JSON bus
//! payloads ready to feed the dispatcher.

use serde::Serialize;

use ribsink_core::types::{EntityState, PeerRec, RouterRec, UnicastPrefixRec};

/// Default timestamp used by all builders.
pub const TS: &str = "2025-06-01 10:00:00";

// =============================================================================
// Record Builders
// =============================================================================

/// Builds a router record.
pub fn router_rec(hash: &str, state: EntityState) -> RouterRec {
    RouterRec {
        hash: hash.to_string(),
        name: format!("router-{hash}"),
        ip_address: "192.0.2.1".to_string(),
        description: String::new(),
        state,
        term_reason_code: 0,
        term_reason_text: String::new(),
        init_data: String::new(),
        timestamp: TS.to_string(),
    }
}

/// Builds a peer record.
pub fn peer_rec(hash: &str, router_hash: &str, state: EntityState) -> PeerRec {
    PeerRec {
        hash: hash.to_string(),
        router_hash: router_hash.to_string(),
        name: format!("peer-{hash}"),
        remote_bgp_id: "203.0.113.1".to_string(),
        remote_asn: 64500,
        remote_ip: "203.0.113.1".to_string(),
        local_asn: 64501,
        local_ip: "203.0.113.2".to_string(),
        state,
        is_l3vpn: false,
        is_pre_policy: true,
        is_ipv4: true,
        timestamp: TS.to_string(),
    }
}

/// Builds a unicast prefix announcement.
pub fn prefix_rec(hash: &str, peer_hash: &str, origin_as: u32, as_path: &str) -> UnicastPrefixRec {
    UnicastPrefixRec {
        hash: hash.to_string(),
        peer_hash: peer_hash.to_string(),
        base_attr_hash: format!("attr-{hash}"),
        is_ipv4: true,
        origin_as: Some(origin_as),
        prefix: "10.0.0.0".to_string(),
        prefix_len: 24,
        timestamp: TS.to_string(),
        is_withdrawn: false,
        path_id: 0,
        labels: String::new(),
        is_pre_policy: true,
        is_adj_rib_in: true,
        as_path: Some(as_path.to_string()),
    }
}

/// Turns an announcement into the matching withdraw.
pub fn withdraw(mut rec: UnicastPrefixRec) -> UnicastPrefixRec {
    rec.is_withdrawn = true;
    rec.base_attr_hash = String::new();
    rec.origin_as = None;
    rec.as_path = None;
    rec
}

// =============================================================================
// Envelope Builders
// =============================================================================

/// Wraps records in a JSON bus envelope without a typed header.
pub fn envelope<T: Serialize>(records: &[T]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "records": records })).unwrap()
}

/// Wraps records in a JSON bus envelope with a typed header and
/// collector hash.
pub fn envelope_typed<T: Serialize>(kind: &str, collector_hash: &str, records: &[T]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": kind,
        "collector_hash_id": collector_hash,
        "records": records,
    }))
    .unwrap()
}
