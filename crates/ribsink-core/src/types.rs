// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Core data types for ribsink.
//!
//! This module defines the record model for every topic the aggregator
//! consumes. Records arrive on the bus already parsed and hashed by the
//! upstream BMP collector; hashes are therefore carried as opaque strings
//! and never recomputed here.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Record Kinds
// =============================================================================

/// The kind of record carried by a bus message.
///
/// A message declares its kind either through the typed envelope header or,
/// when the header is absent, through the topic-name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Collector lifecycle (started/stopped/heartbeat).
    Collector,
    /// Router session state.
    Router,
    /// Peer session state.
    Peer,
    /// Base path attributes shared by prefix announcements.
    BaseAttribute,
    /// IPv4/IPv6 unicast NLRI.
    UnicastPrefix,
    /// L3VPN NLRI.
    #[serde(rename = "l3vpn")]
    L3VpnPrefix,
    /// BGP-LS node object.
    LsNode,
    /// BGP-LS link object.
    LsLink,
    /// BGP-LS prefix object.
    LsPrefix,
    /// BMP statistics report.
    BmpStat,
    /// Notification subscription request.
    Subscription,
}

impl RecordKind {
    /// Resolves a record kind from a topic name by suffix.
    ///
    /// Topic names are dot-separated (`bgpdata.parsed.unicast_prefix`);
    /// only the final component is significant.
    pub fn from_topic(topic: &str) -> Option<Self> {
        let suffix = topic.rsplit('.').next().unwrap_or(topic);
        Self::from_name(suffix)
    }

    /// Resolves a record kind from its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "collector" => Some(RecordKind::Collector),
            "router" => Some(RecordKind::Router),
            "peer" => Some(RecordKind::Peer),
            "base_attribute" => Some(RecordKind::BaseAttribute),
            "unicast_prefix" => Some(RecordKind::UnicastPrefix),
            "l3vpn" => Some(RecordKind::L3VpnPrefix),
            "ls_node" => Some(RecordKind::LsNode),
            "ls_link" => Some(RecordKind::LsLink),
            "ls_prefix" => Some(RecordKind::LsPrefix),
            "bmp_stat" => Some(RecordKind::BmpStat),
            "subscription" => Some(RecordKind::Subscription),
            _ => None,
        }
    }

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Collector => "collector",
            RecordKind::Router => "router",
            RecordKind::Peer => "peer",
            RecordKind::BaseAttribute => "base_attribute",
            RecordKind::UnicastPrefix => "unicast_prefix",
            RecordKind::L3VpnPrefix => "l3vpn",
            RecordKind::LsNode => "ls_node",
            RecordKind::LsLink => "ls_link",
            RecordKind::LsPrefix => "ls_prefix",
            RecordKind::BmpStat => "bmp_stat",
            RecordKind::Subscription => "subscription",
        }
    }

    /// Returns `true` for kinds handled synchronously on the consumer
    /// thread (inventory path) rather than through the writer fleet.
    #[inline]
    pub fn is_inventory(&self) -> bool {
        matches!(
            self,
            RecordKind::Collector | RecordKind::Router | RecordKind::Peer
        )
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Writer Types
// =============================================================================

/// The type of writer pool an intake item is routed to.
///
/// A single pool exists today. The variant is kept so that splitting
/// base-attribute writers away from prefix writers later does not require
/// reworking the pool plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriterType {
    /// The default writer pool, shared by all bulk topics.
    #[default]
    Default,
}

impl WriterType {
    /// All writer types, in pool-creation order.
    pub const ALL: [WriterType; 1] = [WriterType::Default];
}

impl fmt::Display for WriterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterType::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Entity State
// =============================================================================

/// Up/down state carried by collector, router and peer records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    /// Session established.
    Up,
    /// Session terminated.
    #[default]
    Down,
}

impl EntityState {
    /// Returns `true` if the state is up.
    #[inline]
    pub fn is_up(&self) -> bool {
        matches!(self, EntityState::Up)
    }

    /// Returns the state as the lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Up => "up",
            EntityState::Down => "down",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Inventory Records
// =============================================================================

/// Collector lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorRec {
    /// Lifecycle action: `started`, `stopped`, `heartbeat` or `changed`.
    pub action: String,
    /// Collector hash id.
    pub hash: String,
    /// Administrative id (usually hostname).
    pub admin_id: String,
    /// Router hash ids currently connected, space separated.
    #[serde(default)]
    pub routers: String,
    /// Number of connected routers.
    #[serde(default)]
    pub router_count: u32,
    /// Record timestamp, as formatted by the collector.
    pub timestamp: String,
}

impl CollectorRec {
    /// Returns `true` if this record reports the collector going away.
    #[inline]
    pub fn is_down(&self) -> bool {
        self.action == "stopped"
    }
}

/// Router session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterRec {
    /// Router hash id.
    pub hash: String,
    /// Router name (sysName or address).
    pub name: String,
    /// Router management address.
    pub ip_address: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Session state.
    pub state: EntityState,
    /// Termination reason code, when state is down.
    #[serde(default)]
    pub term_reason_code: i32,
    /// Termination reason text, when state is down.
    #[serde(default)]
    pub term_reason_text: String,
    /// Initiation data sent by the router.
    #[serde(default)]
    pub init_data: String,
    /// Record timestamp.
    pub timestamp: String,
}

/// Peer session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRec {
    /// Peer hash id.
    pub hash: String,
    /// Hash id of the router that monitors this peer.
    pub router_hash: String,
    /// Peer name.
    #[serde(default)]
    pub name: String,
    /// Remote BGP identifier.
    pub remote_bgp_id: String,
    /// Remote AS number.
    pub remote_asn: u32,
    /// Remote peering address.
    pub remote_ip: String,
    /// Local AS number.
    pub local_asn: u32,
    /// Local peering address.
    pub local_ip: String,
    /// Session state.
    pub state: EntityState,
    /// Whether this peer carries L3VPN routes.
    #[serde(default)]
    pub is_l3vpn: bool,
    /// Whether the feed is pre-policy.
    #[serde(default = "default_true")]
    pub is_pre_policy: bool,
    /// Whether the transport is IPv4.
    #[serde(default = "default_true")]
    pub is_ipv4: bool,
    /// Record timestamp.
    pub timestamp: String,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Attribute Record
// =============================================================================

/// Base path attributes shared by many prefix announcements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseAttrRec {
    /// Attribute set hash id.
    pub hash: String,
    /// Hash id of the advertising peer.
    pub peer_hash: String,
    /// BGP origin code (igp/egp/incomplete).
    pub origin: String,
    /// AS path, space separated.
    #[serde(default)]
    pub as_path: String,
    /// Number of ASNs in the path.
    #[serde(default)]
    pub as_path_count: u32,
    /// Origin AS (rightmost non-set ASN).
    #[serde(default)]
    pub origin_as: u32,
    /// Next hop address.
    pub next_hop: String,
    /// Multi-exit discriminator.
    #[serde(default)]
    pub med: u32,
    /// Local preference.
    #[serde(default)]
    pub local_pref: u32,
    /// Aggregator attribute.
    #[serde(default)]
    pub aggregator: String,
    /// Standard communities, space separated.
    #[serde(default)]
    pub community_list: String,
    /// Extended communities, space separated.
    #[serde(default)]
    pub ext_community_list: String,
    /// Large communities, space separated.
    #[serde(default)]
    pub large_community_list: String,
    /// Atomic aggregate flag.
    #[serde(default)]
    pub is_atomic_agg: bool,
    /// Whether the next hop is IPv4.
    #[serde(default = "default_true")]
    pub is_nexthop_ipv4: bool,
    /// Record timestamp.
    pub timestamp: String,
}

// =============================================================================
// NLRI Records
// =============================================================================

/// IPv4/IPv6 unicast prefix record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnicastPrefixRec {
    /// NLRI hash id.
    pub hash: String,
    /// Hash id of the advertising peer.
    pub peer_hash: String,
    /// Hash id of the attribute set; empty on withdraws.
    #[serde(default)]
    pub base_attr_hash: String,
    /// Whether the prefix is IPv4.
    #[serde(default = "default_true")]
    pub is_ipv4: bool,
    /// Origin AS; absent on withdraws.
    #[serde(default)]
    pub origin_as: Option<u32>,
    /// Prefix address.
    pub prefix: String,
    /// Prefix length in bits.
    pub prefix_len: u8,
    /// Record timestamp.
    pub timestamp: String,
    /// Whether this is a withdraw.
    #[serde(default)]
    pub is_withdrawn: bool,
    /// ADD-PATH identifier.
    #[serde(default)]
    pub path_id: u32,
    /// MPLS labels, comma separated.
    #[serde(default)]
    pub labels: String,
    /// Whether the feed is pre-policy.
    #[serde(default = "default_true")]
    pub is_pre_policy: bool,
    /// Whether the route is Adj-RIB-In.
    #[serde(default = "default_true")]
    pub is_adj_rib_in: bool,
    /// AS path, space separated; used for subscription matching.
    #[serde(default)]
    pub as_path: Option<String>,
}

/// L3VPN prefix record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L3VpnPrefixRec {
    /// NLRI hash id.
    pub hash: String,
    /// Hash id of the advertising peer.
    pub peer_hash: String,
    /// Hash id of the attribute set; empty on withdraws.
    #[serde(default)]
    pub base_attr_hash: String,
    /// Whether the prefix is IPv4.
    #[serde(default = "default_true")]
    pub is_ipv4: bool,
    /// Origin AS.
    #[serde(default)]
    pub origin_as: u32,
    /// Prefix address.
    pub prefix: String,
    /// Prefix length in bits.
    pub prefix_len: u8,
    /// Record timestamp.
    pub timestamp: String,
    /// Whether this is a withdraw.
    #[serde(default)]
    pub is_withdrawn: bool,
    /// ADD-PATH identifier.
    #[serde(default)]
    pub path_id: u32,
    /// MPLS labels, comma separated.
    #[serde(default)]
    pub labels: String,
    /// Whether the feed is pre-policy.
    #[serde(default = "default_true")]
    pub is_pre_policy: bool,
    /// Whether the route is Adj-RIB-In.
    #[serde(default = "default_true")]
    pub is_adj_rib_in: bool,
    /// Route distinguisher.
    pub rd: String,
    /// Extended communities, space separated.
    #[serde(default)]
    pub ext_community_list: String,
}

/// BGP-LS node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsNodeRec {
    /// Node hash id.
    pub hash: String,
    /// Hash id of the advertising peer.
    pub peer_hash: String,
    /// Hash id of the attribute set.
    #[serde(default)]
    pub base_attr_hash: String,
    /// Node AS number.
    #[serde(default)]
    pub asn: u32,
    /// IGP router id.
    #[serde(default)]
    pub igp_router_id: String,
    /// BGP router id.
    #[serde(default)]
    pub router_id: String,
    /// Node name.
    #[serde(default)]
    pub name: String,
    /// Node flags.
    #[serde(default)]
    pub flags: String,
    /// Source protocol (isis/ospf/direct).
    #[serde(default)]
    pub protocol: String,
    /// Record timestamp.
    pub timestamp: String,
    /// Whether this is a withdraw.
    #[serde(default)]
    pub is_withdrawn: bool,
}

/// BGP-LS link record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsLinkRec {
    /// Link hash id.
    pub hash: String,
    /// Hash id of the advertising peer.
    pub peer_hash: String,
    /// Hash id of the attribute set.
    #[serde(default)]
    pub base_attr_hash: String,
    /// Hash id of the local node.
    pub local_node_hash: String,
    /// Hash id of the remote node.
    pub remote_node_hash: String,
    /// Local interface address.
    #[serde(default)]
    pub interface_ip: String,
    /// Remote interface address.
    #[serde(default)]
    pub neighbor_ip: String,
    /// Multi-topology id.
    #[serde(default)]
    pub mt_id: u32,
    /// IGP metric.
    #[serde(default)]
    pub igp_metric: u32,
    /// Source protocol.
    #[serde(default)]
    pub protocol: String,
    /// Record timestamp.
    pub timestamp: String,
    /// Whether this is a withdraw.
    #[serde(default)]
    pub is_withdrawn: bool,
}

/// BGP-LS prefix record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsPrefixRec {
    /// Prefix hash id.
    pub hash: String,
    /// Hash id of the advertising peer.
    pub peer_hash: String,
    /// Hash id of the attribute set.
    #[serde(default)]
    pub base_attr_hash: String,
    /// Hash id of the originating node.
    pub local_node_hash: String,
    /// Prefix address.
    pub prefix: String,
    /// Prefix length in bits.
    pub prefix_len: u8,
    /// Prefix metric.
    #[serde(default)]
    pub metric: u32,
    /// Source protocol.
    #[serde(default)]
    pub protocol: String,
    /// Record timestamp.
    pub timestamp: String,
    /// Whether this is a withdraw.
    #[serde(default)]
    pub is_withdrawn: bool,
}

// =============================================================================
// Stats and Subscription Records
// =============================================================================

/// BMP statistics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmpStatRec {
    /// Hash id of the reporting peer.
    pub peer_hash: String,
    /// Hash id of the monitored router.
    pub router_hash: String,
    /// Prefixes rejected by inbound policy.
    #[serde(default)]
    pub rejected: u64,
    /// Duplicate prefix advertisements.
    #[serde(default)]
    pub known_dup_prefixes: u64,
    /// Duplicate withdraws.
    #[serde(default)]
    pub known_dup_withdraws: u64,
    /// Updates invalidated due to cluster list.
    #[serde(default)]
    pub invalid_cluster_list: u64,
    /// Updates invalidated due to AS path.
    #[serde(default)]
    pub invalid_as_path: u64,
    /// Updates invalidated due to originator id.
    #[serde(default)]
    pub invalid_originator: u64,
    /// Adj-RIB-In route count, pre-policy.
    #[serde(default)]
    pub routes_pre_policy: u64,
    /// Adj-RIB-In route count, post-policy.
    #[serde(default)]
    pub routes_post_policy: u64,
    /// Record timestamp.
    pub timestamp: String,
}

/// Notification subscription request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRec {
    /// Requested action; only `subscribe` is honored.
    pub action: String,
    /// Subscribed resource, e.g. `AS15169`.
    pub resource: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_topic() {
        assert_eq!(
            RecordKind::from_topic("bgpdata.parsed.unicast_prefix"),
            Some(RecordKind::UnicastPrefix)
        );
        assert_eq!(
            RecordKind::from_topic("bgpdata.parsed.l3vpn"),
            Some(RecordKind::L3VpnPrefix)
        );
        assert_eq!(
            RecordKind::from_topic("bgpdata.parsed.ls_link"),
            Some(RecordKind::LsLink)
        );
        assert_eq!(RecordKind::from_topic("collector"), Some(RecordKind::Collector));
        assert_eq!(RecordKind::from_topic("bgpdata.parsed.nonsense"), None);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            RecordKind::Collector,
            RecordKind::Router,
            RecordKind::Peer,
            RecordKind::BaseAttribute,
            RecordKind::UnicastPrefix,
            RecordKind::L3VpnPrefix,
            RecordKind::LsNode,
            RecordKind::LsLink,
            RecordKind::LsPrefix,
            RecordKind::BmpStat,
            RecordKind::Subscription,
        ] {
            assert_eq!(RecordKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_inventory_kinds() {
        assert!(RecordKind::Collector.is_inventory());
        assert!(RecordKind::Router.is_inventory());
        assert!(RecordKind::Peer.is_inventory());
        assert!(!RecordKind::UnicastPrefix.is_inventory());
        assert!(!RecordKind::BaseAttribute.is_inventory());
    }

    #[test]
    fn test_entity_state() {
        assert!(EntityState::Up.is_up());
        assert!(!EntityState::Down.is_up());
        assert_eq!(EntityState::Up.as_str(), "up");

        let state: EntityState = serde_json::from_str("\"down\"").unwrap();
        assert_eq!(state, EntityState::Down);
    }

    #[test]
    fn test_unicast_prefix_deserialize_defaults() {
        let json = r#"{
            "hash": "h1",
            "peer_hash": "p1",
            "prefix": "10.0.0.0",
            "prefix_len": 24,
            "timestamp": "2025-06-01 10:00:00"
        }"#;

        let rec: UnicastPrefixRec = serde_json::from_str(json).unwrap();
        assert_eq!(rec.hash, "h1");
        assert!(!rec.is_withdrawn);
        assert!(rec.is_ipv4);
        assert!(rec.origin_as.is_none());
        assert!(rec.as_path.is_none());
    }

    #[test]
    fn test_collector_is_down() {
        let rec = CollectorRec {
            action: "stopped".into(),
            hash: "c1".into(),
            admin_id: "collector-a".into(),
            routers: String::new(),
            router_count: 0,
            timestamp: "2025-06-01 10:00:00".into(),
        };
        assert!(rec.is_down());

        let rec = CollectorRec {
            action: "heartbeat".into(),
            ..rec
        };
        assert!(!rec.is_down());
    }

    #[test]
    fn test_writer_type_display() {
        assert_eq!(WriterType::Default.to_string(), "default");
        assert_eq!(WriterType::ALL.len(), 1);
    }
}
