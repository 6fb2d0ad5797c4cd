// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Router upsert builder.

use ribsink_core::cache::RouterCache;
use ribsink_core::types::RouterRec;

use crate::triple::{sql_str, sql_ts, sql_uuid, QueryTriple};

const PREFIX: &str = "INSERT INTO routers \
    (hash_id,name,ip_address,description,state,term_reason_code,term_reason_text,\
    init_data,collector_hash_id,timestamp) VALUES ";

const SUFFIX: &str = " ON CONFLICT (hash_id) DO UPDATE SET \
    name=excluded.name,ip_address=excluded.ip_address,description=excluded.description,\
    state=excluded.state,term_reason_code=excluded.term_reason_code,\
    term_reason_text=excluded.term_reason_text,init_data=excluded.init_data,\
    collector_hash_id=excluded.collector_hash_id,timestamp=excluded.timestamp";

/// Builds the `routers` bulk upsert and the peer cascade update.
#[derive(Debug)]
pub struct RouterQuery {
    collector_hash: Option<String>,
    records: Vec<RouterRec>,
}

impl RouterQuery {
    /// Creates a builder over a decoded router batch.
    ///
    /// `collector_hash` is the envelope header identifying the collector
    /// that owns the session.
    pub fn new(collector_hash: Option<String>, records: Vec<RouterRec>) -> Self {
        Self {
            collector_hash,
            records,
        }
    }

    /// Produces the bulk upsert triple, keyed by router hash.
    pub fn triple(&self) -> QueryTriple {
        let mut triple = QueryTriple::new(PREFIX, SUFFIX);
        let collector = self.collector_hash.as_deref().unwrap_or("");

        for rec in &self.records {
            let tuple = format!(
                "({},{},{},{},{},{},{},{},{},{})",
                sql_uuid(&rec.hash),
                sql_str(&rec.name),
                sql_str(&rec.ip_address),
                sql_str(&rec.description),
                sql_str(rec.state.as_str()),
                rec.term_reason_code,
                sql_str(&rec.term_reason_text),
                sql_str(&rec.init_data),
                sql_uuid(collector),
                sql_ts(&rec.timestamp),
            );

            triple.values.insert(rec.hash.clone(), tuple);
        }

        triple
    }

    /// Cascade: a router that went down with no surviving up connection
    /// takes its peers down.
    ///
    /// The cache passed in reflects the state committed *before* this
    /// batch, so `up_count <= 1` means the connection reported down here
    /// was the router's last one.
    pub fn peer_router_update(&self, cache: &RouterCache) -> Option<String> {
        let downed: Vec<&RouterRec> = self
            .records
            .iter()
            .filter(|r| !r.state.is_up())
            .filter(|r| cache.get(&r.hash).map(|e| e.up_count <= 1).unwrap_or(true))
            .collect();

        let last = downed.last()?;

        let hashes = downed
            .iter()
            .map(|r| sql_uuid(&r.hash))
            .collect::<Vec<_>>()
            .join(",");

        Some(format!(
            "UPDATE peers SET state = 'down', timestamp = {} \
             WHERE state = 'up' AND router_hash_id IN ({})",
            sql_ts(&last.timestamp),
            hashes,
        ))
    }
}
