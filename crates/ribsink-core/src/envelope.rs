// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Bus message envelope and record codec.
//!
//! Every bus record value is a JSON envelope:
//!
//! ```json
//! { "type": "router", "collector_hash_id": "…", "records": [ … ] }
//! ```
//!
//! The `type` header is optional; when present it takes precedence over
//! the topic-name suffix for handler selection. `records` is a
//! homogeneous list decoded into the typed record structs from
//! [`crate::types`].
//!
//! The codec is deliberately a single seam - [`decode_envelope`] - so a
//! different wire format can be swapped in without touching dispatch.

use serde::Deserialize;

use crate::error::{DecodeError, DecodeResult};
use crate::types::{
    BaseAttrRec, BmpStatRec, CollectorRec, L3VpnPrefixRec, LsLinkRec, LsNodeRec, LsPrefixRec,
    PeerRec, RecordKind, RouterRec, SubscriptionRec, UnicastPrefixRec,
};

// =============================================================================
// Decoded Message
// =============================================================================

/// A typed batch of records decoded from one bus message.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBatch {
    /// Collector lifecycle records.
    Collector(Vec<CollectorRec>),
    /// Router session records.
    Router(Vec<RouterRec>),
    /// Peer session records.
    Peer(Vec<PeerRec>),
    /// Base attribute records.
    BaseAttribute(Vec<BaseAttrRec>),
    /// Unicast prefix records.
    UnicastPrefix(Vec<UnicastPrefixRec>),
    /// L3VPN prefix records.
    L3VpnPrefix(Vec<L3VpnPrefixRec>),
    /// Link-state node records.
    LsNode(Vec<LsNodeRec>),
    /// Link-state link records.
    LsLink(Vec<LsLinkRec>),
    /// Link-state prefix records.
    LsPrefix(Vec<LsPrefixRec>),
    /// BMP statistics records.
    BmpStat(Vec<BmpStatRec>),
    /// Subscription requests.
    Subscription(Vec<SubscriptionRec>),
}

impl RecordBatch {
    /// Returns the number of records in the batch.
    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Collector(r) => r.len(),
            RecordBatch::Router(r) => r.len(),
            RecordBatch::Peer(r) => r.len(),
            RecordBatch::BaseAttribute(r) => r.len(),
            RecordBatch::UnicastPrefix(r) => r.len(),
            RecordBatch::L3VpnPrefix(r) => r.len(),
            RecordBatch::LsNode(r) => r.len(),
            RecordBatch::LsLink(r) => r.len(),
            RecordBatch::LsPrefix(r) => r.len(),
            RecordBatch::BmpStat(r) => r.len(),
            RecordBatch::Subscription(r) => r.len(),
        }
    }

    /// Returns `true` if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded bus message: resolved kind, envelope headers and records.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// The resolved record kind.
    pub kind: RecordKind,
    /// Collector hash id from the envelope header, when present.
    pub collector_hash: Option<String>,
    /// The typed record batch.
    pub batch: RecordBatch,
}

// =============================================================================
// Codec
// =============================================================================

/// Raw envelope shape prior to kind resolution.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    collector_hash_id: Option<String>,
    records: serde_json::Value,
}

/// Decodes a bus message value into a typed record batch.
///
/// Kind resolution order: typed `type` header first, topic-name suffix
/// second. A message whose kind cannot be resolved yields
/// [`DecodeError::UnknownTopic`]; the caller logs and drops it.
pub fn decode_envelope(topic: &str, payload: &[u8]) -> DecodeResult<DecodedMessage> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let raw: RawEnvelope = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::malformed(e.to_string()))?;

    let kind = raw
        .kind
        .as_deref()
        .and_then(RecordKind::from_name)
        .or_else(|| RecordKind::from_topic(topic))
        .ok_or_else(|| DecodeError::unknown_topic(topic))?;

    let batch = decode_records(kind, raw.records)?;

    Ok(DecodedMessage {
        kind,
        collector_hash: raw.collector_hash_id,
        batch,
    })
}

fn decode_records(kind: RecordKind, records: serde_json::Value) -> DecodeResult<RecordBatch> {
    fn de<T: serde::de::DeserializeOwned>(v: serde_json::Value) -> DecodeResult<Vec<T>> {
        serde_json::from_value(v).map_err(|e| DecodeError::malformed(e.to_string()))
    }

    Ok(match kind {
        RecordKind::Collector => RecordBatch::Collector(de(records)?),
        RecordKind::Router => RecordBatch::Router(de(records)?),
        RecordKind::Peer => RecordBatch::Peer(de(records)?),
        RecordKind::BaseAttribute => RecordBatch::BaseAttribute(de(records)?),
        RecordKind::UnicastPrefix => RecordBatch::UnicastPrefix(de(records)?),
        RecordKind::L3VpnPrefix => RecordBatch::L3VpnPrefix(de(records)?),
        RecordKind::LsNode => RecordBatch::LsNode(de(records)?),
        RecordKind::LsLink => RecordBatch::LsLink(de(records)?),
        RecordKind::LsPrefix => RecordBatch::LsPrefix(de(records)?),
        RecordKind::BmpStat => RecordBatch::BmpStat(de(records)?),
        RecordKind::Subscription => RecordBatch::Subscription(de(records)?),
    })
}

// =============================================================================
// Tests
// =============================================================================
