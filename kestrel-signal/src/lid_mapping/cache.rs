// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};

/// Bounds of the in-process mapping cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingCacheConfig {
    pub max_entries: u64,

    /// Entries expire after this long without being read or written.
    pub ttl: Duration,
}

impl Default for MappingCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub size: u64,
    pub max: u64,
    pub ttl: Duration,
}

/// Accelerator for user-level lookups in both directions.
///
/// A miss never means "unmapped", callers fall back to the key store.
#[derive(Clone)]
pub(crate) struct MappingCache {
    entries: Cache<String, String>,
    config: MappingCacheConfig,
}

fn pn_key(pn_user: &str) -> String {
    format!("pn:{pn_user}")
}

fn lid_key(lid_user: &str) -> String {
    format!("lid:{lid_user}")
}

impl MappingCache {
    pub fn new(config: MappingCacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_idle(config.ttl)
            .build();
        Self { entries, config }
    }

    pub fn lid_for_pn(&self, pn_user: &str) -> Option<String> {
        self.entries.get(&pn_key(pn_user))
    }

    pub fn pn_for_lid(&self, lid_user: &str) -> Option<String> {
        self.entries.get(&lid_key(lid_user))
    }

    pub fn insert_lid_for_pn(&self, pn_user: &str, lid_user: &str) {
        self.entries.insert(pn_key(pn_user), lid_user.to_string());
    }

    pub fn insert_pn_for_lid(&self, lid_user: &str, pn_user: &str) {
        self.entries.insert(lid_key(lid_user), pn_user.to_string());
    }

    pub fn insert_pair(&self, pn_user: &str, lid_user: &str) {
        self.insert_lid_for_pn(pn_user, lid_user);
        self.insert_pn_for_lid(lid_user, pn_user);
    }

    pub fn remove_pn(&self, pn_user: &str) {
        self.entries.invalidate(&pn_key(pn_user));
    }

    pub fn remove_lid(&self, lid_user: &str) {
        self.entries.invalidate(&lid_key(lid_user));
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks();
        CacheStats {
            size: self.entries.entry_count(),
            max: self.config.max_entries,
            ttl: self.config.ttl,
        }
    }
}
