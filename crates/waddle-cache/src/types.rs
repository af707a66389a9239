use serde::{Deserialize, Serialize};

/// Which tier satisfied a lookup, or that it missed everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    L1,
    L2,
    L3,
    Miss,
}

/// A row as persisted in the L3 durable tier, with the bookkeeping fields
/// the GC pass reads (`access_count`, `last_accessed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRow {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: String,
    pub access_count: u64,
    pub last_accessed: String,
}

/// Aggregate counters for `get_cache_stats` — total entries and per-tier
/// hit/miss counts since process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub l3_entries: u64,
}
