// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Consumer-thread state caches.
//!
//! Both caches are owned and accessed exclusively by the consumer engine
//! thread, so neither needs interior locking.
//!
//! - [`RouterCache`] mirrors the `routers` table. It is cleared and
//!   rebuilt from a full select after every router upsert, so peer-update
//!   synthesis always sees committed state.
//! - [`AttrDedupCache`] suppresses re-upserts of base attribute sets that
//!   were seen recently. Attribute sets recur identically across many
//!   prefix updates; the cache removes the bulk of redundant writes.

use std::collections::HashMap;

use tracing::warn;

// =============================================================================
// Router Cache
// =============================================================================

/// One cached router row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterEntry {
    /// Router name from the inventory table.
    pub name: String,
    /// Number of connections currently in the `up` state.
    pub up_count: u32,
}

/// In-memory mirror of the `routers` table.
///
/// A router may be connected through more than one collector; `up_count`
/// tracks how many of its rows report `up` so that losing one connection
/// does not take the peers of a still-connected router down.
#[derive(Debug, Default)]
pub struct RouterCache {
    entries: HashMap<String, RouterEntry>,
}

impl RouterCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears and rebuilds the cache from `SELECT name, hash_id, state`
    /// rows.
    ///
    /// Row shape: each row maps column name to its textual value. Rows
    /// missing a required column are skipped with a warning; a select that
    /// returns no rows leaves the previous cache contents in place.
    pub fn rebuild(&mut self, rows: &[HashMap<String, String>]) {
        if rows.is_empty() {
            return;
        }

        self.entries.clear();

        for row in rows {
            let (hash, name, state) = match (row.get("hash_id"), row.get("name"), row.get("state"))
            {
                (Some(h), Some(n), Some(s)) => (h, n, s),
                _ => {
                    warn!("router row missing expected columns, skipping");
                    continue;
                }
            };

            // Hash ids may arrive dashed (uuid text form); normalize.
            let hash = hash.replace('-', "");

            let entry = self.entries.entry(hash).or_insert_with(|| RouterEntry {
                name: name.clone(),
                up_count: 0,
            });

            if state == "up" {
                entry.up_count += 1;
            }
        }
    }

    /// Returns the cached entry for a router hash, if present.
    pub fn get(&self, hash: &str) -> Option<&RouterEntry> {
        self.entries.get(&hash.replace('-', ""))
    }

    /// Returns `true` if the router has at least one connection up.
    pub fn is_up(&self, hash: &str) -> bool {
        self.get(hash).map(|e| e.up_count > 0).unwrap_or(false)
    }

    /// Returns the number of cached routers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Attribute Dedup Cache
// =============================================================================

/// Short-TTL set of recently seen base-attribute hashes.
#[derive(Debug)]
pub struct AttrDedupCache {
    seen: HashMap<String, i64>,
    age_millis: i64,
}

impl AttrDedupCache {
    /// Creates a cache whose entries expire after `age_millis`.
    pub fn new(age_millis: i64) -> Self {
        Self {
            seen: HashMap::new(),
            age_millis,
        }
    }

    /// Observes an attribute hash at `now_ms`.
    ///
    /// Returns `true` if the hash is new and the record should be
    /// forwarded; `false` if it was seen recently and the record should be
    /// dropped. Either way the last-seen timestamp is refreshed, so a hash
    /// under constant traffic never expires.
    pub fn observe(&mut self, hash: &str, now_ms: i64) -> bool {
        match self.seen.get_mut(hash) {
            Some(last_seen) => {
                *last_seen = now_ms;
                false
            }
            None => {
                self.seen.insert(hash.to_string(), now_ms);
                true
            }
        }
    }

    /// Removes entries older than the configured age.
    ///
    /// Returns the number of purged entries.
    pub fn purge(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms - self.age_millis;
        let before = self.seen.len();
        self.seen.retain(|_, last_seen| *last_seen > cutoff);
        before - self.seen.len()
    }

    /// Returns the number of cached hashes.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn router_row(name: &str, hash: &str, state: &str) -> HashMap<String, String> {
        let mut row = HashMap::new();
        row.insert("name".to_string(), name.to_string());
        row.insert("hash_id".to_string(), hash.to_string());
        row.insert("state".to_string(), state.to_string());
        row
    }

    #[test]
    fn test_router_cache_rebuild() {
        let mut cache = RouterCache::new();
        cache.rebuild(&[
            router_row("edge1", "r1", "up"),
            router_row("edge2", "r2", "down"),
        ]);

        assert_eq!(cache.len(), 2);
        assert!(cache.is_up("r1"));
        assert!(!cache.is_up("r2"));
        assert!(!cache.is_up("r3"));
    }

    #[test]
    fn test_router_cache_counts_connections() {
        // Same router seen through two collectors, one connection down.
        let mut cache = RouterCache::new();
        cache.rebuild(&[
            router_row("edge1", "r1", "up"),
            router_row("edge1", "r1", "up"),
            router_row("edge1", "r1", "down"),
        ]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("r1").unwrap().up_count, 2);
    }

    #[test]
    fn test_router_cache_normalizes_dashed_hashes() {
        let mut cache = RouterCache::new();
        cache.rebuild(&[router_row(
            "edge1",
            "0cb7d9b1-4aa1-44c9-b025-0e9a6b6ddcf4",
            "up",
        )]);

        assert!(cache.is_up("0cb7d9b14aa144c9b0250e9a6b6ddcf4"));
        assert!(cache.is_up("0cb7d9b1-4aa1-44c9-b025-0e9a6b6ddcf4"));
    }

    #[test]
    fn test_router_cache_empty_select_keeps_state() {
        let mut cache = RouterCache::new();
        cache.rebuild(&[router_row("edge1", "r1", "up")]);
        cache.rebuild(&[]);
        assert!(cache.is_up("r1"));
    }

    #[test]
    fn test_router_cache_rebuild_replaces() {
        let mut cache = RouterCache::new();
        cache.rebuild(&[router_row("edge1", "r1", "up")]);
        cache.rebuild(&[router_row("edge2", "r2", "up")]);

        assert!(cache.get("r1").is_none());
        assert!(cache.is_up("r2"));
    }

    #[test]
    fn test_dedup_first_observation_forwards() {
        let mut cache = AttrDedupCache::new(1_200_000);
        assert!(cache.observe("a1", 1_000));
        assert!(!cache.observe("a1", 2_000));
        assert!(!cache.observe("a1", 3_000));
        assert!(cache.observe("a2", 3_000));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_dedup_purge_by_age() {
        let mut cache = AttrDedupCache::new(1_200_000);
        cache.observe("old", 0);
        cache.observe("fresh", 1_000_000);

        let purged = cache.purge(1_300_000);
        assert_eq!(purged, 1);
        assert_eq!(cache.len(), 1);

        // The purged hash is treated as new again.
        assert!(cache.observe("old", 1_300_001));
    }

    #[test]
    fn test_dedup_touch_extends_lifetime() {
        let mut cache = AttrDedupCache::new(1_000);
        cache.observe("a1", 0);
        // Touched at 900, so still live at 1500.
        cache.observe("a1", 900);
        assert_eq!(cache.purge(1_500), 0);
        assert!(!cache.observe("a1", 1_600));
    }
}
