use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::Result;
use crate::types::{CacheRow, CacheStats};

struct TierEntry {
    value: serde_json::Value,
    inserted_at: Instant,
}

/// Three-tier cache: L1 in-process, bounded, short TTL; L2 in-process,
/// longer TTL, standing in for a shared cache service; L3 durable,
/// `rusqlite`-backed with access-count/last-accessed GC.
///
/// Lookup order on read: L1 → L2 → L3, promoting to faster tiers on a hit.
/// Writes go through every tier. A single `Mutex` guards each in-process
/// tier's map, keyed by the cache key directly (callers pre-hash via
/// [`hash_key`] where a stable, bounded-length key is needed).
pub struct TriTierCache {
    db: Mutex<Connection>,
    l1: Mutex<HashMap<String, TierEntry>>,
    l2: Mutex<HashMap<String, TierEntry>>,
    l1_ttl: Duration,
    l2_ttl: Duration,
    l1_max_entries: usize,
    stats: Mutex<CacheStats>,
}

impl TriTierCache {
    pub fn open(conn: Connection, l1_ttl: Duration, l2_ttl: Duration, l1_max_entries: usize) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            l1: Mutex::new(HashMap::new()),
            l2: Mutex::new(HashMap::new()),
            l1_ttl,
            l2_ttl,
            l1_max_entries,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    /// Read a value by key, promoting it to faster tiers on an L2/L3 hit.
    #[instrument(skip(self))]
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        if let Some(v) = self.get_l1(key) {
            self.stats.lock().unwrap().l1_hits += 1;
            debug!(key, tier = "l1", "cache hit");
            return Ok(Some(serde_json::from_value(v)?));
        }

        if let Some(v) = self.get_l2(key) {
            self.stats.lock().unwrap().l2_hits += 1;
            debug!(key, tier = "l2", "cache hit");
            self.put_l1(key, v.clone());
            return Ok(Some(serde_json::from_value(v)?));
        }

        if let Some(row) = self.get_l3(key)? {
            self.stats.lock().unwrap().l3_hits += 1;
            debug!(key, tier = "l3", "cache hit");
            self.put_l2(key, row.value.clone());
            self.put_l1(key, row.value.clone());
            return Ok(Some(serde_json::from_value(row.value)?));
        }

        self.stats.lock().unwrap().misses += 1;
        Ok(None)
    }

    /// Write-through a value to every tier. L3 uses an upsert so concurrent
    /// misses computing the same value converge safely.
    pub fn put<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.put_l1(key, json.clone());
        self.put_l2(key, json.clone());
        self.put_l3(key, json)?;
        Ok(())
    }

    fn get_l1(&self, key: &str) -> Option<serde_json::Value> {
        let mut l1 = self.l1.lock().unwrap();
        match l1.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.l1_ttl => Some(entry.value.clone()),
            Some(_) => {
                l1.remove(key);
                None
            }
            None => None,
        }
    }

    fn get_l2(&self, key: &str) -> Option<serde_json::Value> {
        let mut l2 = self.l2.lock().unwrap();
        match l2.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.l2_ttl => Some(entry.value.clone()),
            Some(_) => {
                l2.remove(key);
                None
            }
            None => None,
        }
    }

    fn get_l3(&self, key: &str) -> Result<Option<CacheRow>> {
        let conn = self.db.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT key, value, created_at, access_count, last_accessed
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |r| {
                    let value_str: String = r.get(1)?;
                    Ok((
                        r.get::<_, String>(0)?,
                        value_str,
                        r.get::<_, String>(2)?,
                        r.get::<_, u64>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, value_str, created_at, access_count, _last_accessed)) = row else {
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE cache_entries SET access_count = access_count + 1, last_accessed = ?1 WHERE key = ?2",
            params![now, key],
        )?;

        Ok(Some(CacheRow {
            key,
            value: serde_json::from_str(&value_str)?,
            created_at,
            access_count: access_count + 1,
            last_accessed: now,
        }))
    }

    fn put_l1(&self, key: &str, value: serde_json::Value) {
        let mut l1 = self.l1.lock().unwrap();
        if l1.len() >= self.l1_max_entries && !l1.contains_key(key) {
            // Bounded map, no eviction metadata kept for O(1) LRU; drop an
            // arbitrary entry rather than grow unbounded.
            if let Some(evict_key) = l1.keys().next().cloned() {
                l1.remove(&evict_key);
            }
        }
        l1.insert(
            key.to_string(),
            TierEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn put_l2(&self, key: &str, value: serde_json::Value) {
        let mut l2 = self.l2.lock().unwrap();
        l2.insert(
            key.to_string(),
            TierEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn put_l3(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO cache_entries (key, value, created_at, access_count, last_accessed)
             VALUES (?1, ?2, ?3, 0, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                last_accessed = excluded.last_accessed",
            params![key, value.to_string(), now],
        )?;
        Ok(())
    }

    /// Remove L3 rows with `access_count < min_access_count` whose
    /// `last_accessed` is older than `older_than_days` days. Entries in L1/L2
    /// expire on their own via TTL and are not touched here.
    pub fn gc(&self, min_access_count: u64, older_than_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(older_than_days)).to_rfc3339();
        let conn = self.db.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE access_count < ?1 AND last_accessed < ?2",
            params![min_access_count, cutoff],
        )?;
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = self.stats.lock().unwrap().clone();
        let conn = self.db.lock().unwrap();
        stats.l3_entries = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;
        Ok(stats)
    }
}

/// SHA-256 hex digest over the colon-joined parts — the translation cache
/// key is `sha256("{src}:{tgt}:{text}")`; other callers compose their own
/// parts the same way for a stable, bounded-length key.
pub fn hash_key(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let joined = parts.join(":");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> TriTierCache {
        TriTierCache::open(
            Connection::open_in_memory().unwrap(),
            Duration::from_secs(3600),
            Duration::from_secs(86_400),
            10_000,
        )
        .unwrap()
    }

    #[test]
    fn miss_then_put_then_l1_hit() {
        let cache = test_cache();
        assert_eq!(cache.get::<String>("k1").unwrap(), None);
        cache.put("k1", &"hello".to_string()).unwrap();
        assert_eq!(cache.get::<String>("k1").unwrap(), Some("hello".to_string()));
        let stats = cache.stats().unwrap();
        assert_eq!(stats.l1_hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn l3_hit_promotes_to_l1_and_l2() {
        let cache = test_cache();
        cache.put("k2", &42i64).unwrap();
        // Evict from the in-process tiers directly to force an L3 round-trip.
        cache.l1.lock().unwrap().clear();
        cache.l2.lock().unwrap().clear();

        let v: Option<i64> = cache.get("k2").unwrap();
        assert_eq!(v, Some(42));
        let stats = cache.stats().unwrap();
        assert_eq!(stats.l3_hits, 1);

        // Promoted — subsequent read is an L1 hit.
        let v2: Option<i64> = cache.get("k2").unwrap();
        assert_eq!(v2, Some(42));
        assert_eq!(cache.stats().unwrap().l1_hits, 1);
    }

    #[test]
    fn write_through_is_coherent_across_tiers() {
        let cache = test_cache();
        cache.put("k3", &"v".to_string()).unwrap();
        assert_eq!(cache.get_l1("k3"), Some(serde_json::json!("v")));
        assert_eq!(cache.get_l2("k3"), Some(serde_json::json!("v")));
        let row = cache.get_l3("k3").unwrap().unwrap();
        assert_eq!(row.value, serde_json::json!("v"));
    }

    #[test]
    fn gc_removes_low_access_old_rows() {
        let cache = test_cache();
        cache.put("stale", &"v".to_string()).unwrap();
        {
            let conn = cache.db.lock().unwrap();
            let old = (Utc::now() - chrono::Duration::days(40)).to_rfc3339();
            conn.execute(
                "UPDATE cache_entries SET last_accessed = ?1 WHERE key = 'stale'",
                params![old],
            )
            .unwrap();
        }
        let removed = cache.gc(5, 30).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.get_l3("stale").unwrap(), None);
    }

    #[test]
    fn hash_key_is_stable_for_same_parts() {
        let a = hash_key(&["es", "en", "hola mundo"]);
        let b = hash_key(&["es", "en", "hola mundo"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let c = hash_key(&["es", "en", "hola mundo!"]);
        assert_ne!(a, c);
    }
}
