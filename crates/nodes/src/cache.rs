//! Time-bounded response cache partitions.
//!
//! A [`ResponseCache`] is an LRU map with an absolute TTL: an entry leaves
//! when it is the least-recently used at capacity or when it is older than the
//! TTL, whichever comes first. Entries are never edited in place; a `put` for
//! an existing key replaces the whole entry and invalidation removes.
//!
//! All reads and writes of one partition go through a single async mutex, so
//! concurrent batch workers never observe a half-finished eviction. Cache
//! operations are map lookups, far cheaper than the provider round-trip they
//! save, so contention on that lock stays low.
//!
//! [`CachePartitions`] bundles the three partitions the application uses,
//! each with its own capacity and TTL.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use pipeline::{AnalysisResult, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Capacity and TTL of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CachePolicy {
    /// Maximum number of entries (at least 1).
    pub capacity: usize,
    /// Absolute age after which an entry is treated as absent.
    #[serde(rename = "ttl_secs", with = "ttl_secs")]
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }
}

mod ttl_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(ttl.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// One stored value.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Key the entry was stored under (a fingerprint for analyses).
    pub key: String,
    pub value: V,
    /// Wall-clock time of insertion.
    pub stored_at: Timestamp,
    inserted: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted) >= ttl
    }
}

/// Counters for one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by capacity or age (not by explicit invalidation).
    pub evictions: u64,
    pub len: usize,
}

/// An LRU + TTL cache partition.
pub struct ResponseCache<V> {
    name: &'static str,
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    /// Creates an empty partition. A zero capacity is raised to one.
    pub fn new(name: &'static str, policy: CachePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: policy.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Partition name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the value for `key` if present and younger than the TTL.
    ///
    /// An expired entry found here is removed.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(partition = self.name, key, "Cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Returns the whole entry for `key` (including `stored_at`) if live.
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl, now))
            .cloned()
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub async fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: Timestamp::now(),
            inserted: Instant::now(),
        };

        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(partition = self.name, key = %evicted, "Cache entry evicted at capacity");
            }
        }
    }

    /// Removes `key`. Returns `true` if it was present.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    /// Removes every entry whose key contains `fragment`. Returns the count removed.
    pub async fn invalidate_matching(&self, fragment: &str) -> usize {
        self.invalidate_where(|key, _| key.contains(fragment)).await
    }

    /// Removes every entry for which `predicate(key, value)` holds.
    pub async fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, &V) -> bool,
    {
        let mut entries = self.entries.lock().await;
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| predicate(key.as_str(), &entry.value))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }
        if !doomed.is_empty() {
            tracing::debug!(partition = self.name, removed = doomed.len(), "Cache entries invalidated");
        }
        doomed.len()
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Drops entries older than the TTL. Returns the count removed.
    pub async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.evictions
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Number of stored entries, including any not yet pruned.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Partitions
// ---------------------------------------------------------------------------

/// Per-partition tuning.
///
/// Deserializes from a table of partial overrides: a partition or field that
/// is left out keeps its entry from [`PartitionPolicies::default`], and an
/// unknown partition or field name is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionPolicies {
    /// Ticket/view listings: change rarely, long TTL.
    pub listings: CachePolicy,
    /// Per-item analyses keyed by fingerprint.
    pub analyses: CachePolicy,
    /// Identity lookups (users, organisations).
    pub identities: CachePolicy,
}

impl Default for PartitionPolicies {
    fn default() -> Self {
        Self {
            listings: CachePolicy::new(64, Duration::from_secs(600)),
            analyses: CachePolicy::new(1000, Duration::from_secs(300)),
            identities: CachePolicy::new(256, Duration::from_secs(3600)),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyOverride {
    capacity: Option<usize>,
    ttl_secs: Option<u64>,
}

fn merge(over: Option<PolicyOverride>, base: CachePolicy) -> CachePolicy {
    let Some(over) = over else {
        return base;
    };
    CachePolicy {
        capacity: over.capacity.unwrap_or(base.capacity),
        ttl: over.ttl_secs.map_or(base.ttl, Duration::from_secs),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PartitionOverrides {
    listings: Option<PolicyOverride>,
    analyses: Option<PolicyOverride>,
    identities: Option<PolicyOverride>,
}

impl<'de> Deserialize<'de> for PartitionPolicies {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let over = PartitionOverrides::deserialize(deserializer)?;
        let base = Self::default();
        Ok(Self {
            listings: merge(over.listings, base.listings),
            analyses: merge(over.analyses, base.analyses),
            identities: merge(over.identities, base.identities),
        })
    }
}

/// The three cache partitions, each with its own lock, capacity and TTL.
///
/// Partitions are reference-counted so each can be handed to the component
/// that uses it.
pub struct CachePartitions {
    pub listings: Arc<ResponseCache<serde_json::Value>>,
    pub analyses: Arc<ResponseCache<AnalysisResult>>,
    pub identities: Arc<ResponseCache<serde_json::Value>>,
}

impl CachePartitions {
    pub fn new(policies: PartitionPolicies) -> Self {
        Self {
            listings: Arc::new(ResponseCache::new("listings", policies.listings)),
            analyses: Arc::new(ResponseCache::new("analyses", policies.analyses)),
            identities: Arc::new(ResponseCache::new("identities", policies.identities)),
        }
    }

    /// Drops every entry in every partition.
    pub async fn clear_all(&self) {
        self.listings.clear().await;
        self.analyses.clear().await;
        self.identities.clear().await;
    }

    /// Prunes aged entries in every partition. Returns the total removed.
    pub async fn prune_expired(&self) -> usize {
        self.listings.prune_expired().await
            + self.analyses.prune_expired().await
            + self.identities.prune_expired().await
    }
}

impl Default for CachePartitions {
    fn default() -> Self {
        Self::new(PartitionPolicies::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::RequestId;

    fn cache(capacity: usize, ttl: Duration) -> ResponseCache<String> {
        ResponseCache::new("test", CachePolicy::new(capacity, ttl))
    }

    #[tokio::test]
    async fn test_put_then_get_returns_equal_value() {
        let partitions = CachePartitions::default();
        let result = AnalysisResult::empty_content(RequestId::new("T-1").unwrap());

        partitions.analyses.put("fp-1", result.clone()).await;
        assert_eq!(partitions.analyses.get("fp-1").await, Some(result));
    }

    #[tokio::test]
    async fn test_invalidate_removes_key() {
        let cache = cache(10, Duration::from_secs(60));
        cache.put("fp-1", "a".to_string()).await;

        assert!(cache.invalidate("fp-1").await);
        assert_eq!(cache.get("fp-1").await, None);
        assert!(!cache.invalidate("fp-1").await);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = cache(10, Duration::from_millis(100));
        cache.put("k", "v".to_string()).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let cache = cache(2, Duration::from_secs(60));
        cache.put("key1", "1".to_string()).await;
        cache.put("key2", "2".to_string()).await;
        // Touch key1 so key2 becomes least recently used.
        assert!(cache.get("key1").await.is_some());
        cache.put("key3", "3".to_string()).await;

        assert!(cache.get("key1").await.is_some(), "key1 was recently used");
        assert!(cache.get("key2").await.is_none(), "key2 should be evicted");
        assert!(cache.get("key3").await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_replacing_a_key_is_not_an_eviction() {
        let cache = cache(2, Duration::from_secs(60));
        cache.put("k", "old".to_string()).await;
        cache.put("k", "new".to_string()).await;

        assert_eq!(cache.get("k").await.as_deref(), Some("new"));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_invalidate_matching_substring() {
        let cache = cache(10, Duration::from_secs(60));
        cache.put("ticket:41:analysis", "a".to_string()).await;
        cache.put("ticket:42:analysis", "b".to_string()).await;
        cache.put("ticket:42:comments", "c".to_string()).await;

        assert_eq!(cache.invalidate_matching("ticket:42").await, 2);
        assert!(cache.get("ticket:41:analysis").await.is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_where_inspects_values() {
        let cache = cache(10, Duration::from_secs(60));
        cache.put("a", "keep".to_string()).await;
        cache.put("b", "drop".to_string()).await;

        assert_eq!(cache.invalidate_where(|_, v| v == "drop").await, 1);
        assert!(cache.get("a").await.is_some());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let cache = cache(10, Duration::from_secs(60));
        cache.put("a", "1".to_string()).await;
        cache.get("a").await;
        cache.get("missing").await;

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_prune_expired_across_partitions() {
        let short = CachePolicy::new(10, Duration::from_millis(50));
        let partitions = CachePartitions::new(PartitionPolicies {
            listings: short,
            analyses: short,
            identities: CachePolicy::new(10, Duration::from_secs(60)),
        });
        partitions.listings.put("l", serde_json::json!([1, 2])).await;
        partitions.identities.put("u", serde_json::json!({"name": "ada"})).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(partitions.prune_expired().await, 1);
        assert!(partitions.identities.get("u").await.is_some());
    }

    #[tokio::test]
    async fn test_stored_at_recorded() {
        let cache = cache(10, Duration::from_secs(60));
        let before = Timestamp::now();
        cache.put("k", "v".to_string()).await;

        let entry = cache.get_entry("k").await.unwrap();
        assert_eq!(entry.key, "k");
        assert!(entry.stored_at >= before);
    }
}
