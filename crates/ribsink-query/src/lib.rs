// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-query
//!
//! Bulk upsert statement builders, one per record kind.
//!
//! Each builder turns a batch of decoded records into a
//! [`QueryTriple`]: an `INSERT INTO … VALUES` prefix, an
//! `ON CONFLICT … DO UPDATE` suffix, and a map of per-record value
//! tuples keyed by the record's primary hash. The writer merges triples
//! that share `(prefix, suffix)` and conflates duplicate keys before
//! shipping a single bulk statement.
//!
//! NLRI upserts preserve `base_attr_hash_id` and `origin_as` from the
//! stored row when the incoming record is a withdraw - a withdraw must
//! not erase the last known attribute reference.
//!
//! Inventory builders additionally synthesize cascade statements:
//! a collector going away marks its routers down, a router going down
//! (with no surviving connection) marks its peers down, and a peer going
//! down marks its RIB entries withdrawn.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod base_attr;
pub mod bmp_stat;
pub mod collector;
pub mod l3vpn;
pub mod ls_link;
pub mod ls_node;
pub mod ls_prefix;
pub mod peer;
pub mod router;
pub mod triple;
pub mod unicast_prefix;

pub use base_attr::BaseAttrQuery;
pub use bmp_stat::BmpStatQuery;
pub use collector::CollectorQuery;
pub use l3vpn::L3VpnPrefixQuery;
pub use ls_link::LsLinkQuery;
pub use ls_node::LsNodeQuery;
pub use ls_prefix::LsPrefixQuery;
pub use peer::PeerQuery;
pub use router::RouterQuery;
pub use triple::QueryTriple;
pub use unicast_prefix::UnicastPrefixQuery;
