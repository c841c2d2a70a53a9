//! Single-entry placement score cache with TTL expiration.
//!
//! Only one result set is held at a time. A lookup with a different key
//! misses, and the next store replaces the held entry outright.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use spotprio_core::ScoreMap;

/// Minimum safe refresh interval for placement scores.
pub const PLACEMENT_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    key: String,
    refreshed_at: Instant,
    scores: ScoreMap,
}

/// Shared placement score cache.
///
/// Owned by the caller and handed to the fetcher (usually behind an
/// `Arc`). Every access goes through one mutex; guards are scoped to a
/// single method so the lock never outlives a call.
pub struct PlacementCache {
    entry: Mutex<Option<CacheEntry>>,
    ttl: Duration,
}

impl Default for PlacementCache {
    fn default() -> Self {
        Self::new(PLACEMENT_TTL)
    }
}

impl PlacementCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    /// Composite key over the sorted, de-duplicated instance types, so the
    /// order callers list them in does not matter.
    pub fn cache_key(region: &str, account: &str, instance_types: &[String]) -> String {
        let mut sorted: Vec<&str> = instance_types.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        format!("{region}-{account}-{}", sorted.join(","))
    }

    /// Held scores if `key` matches and the entry is younger than the TTL.
    pub async fn get(&self, key: &str) -> Option<ScoreMap> {
        let guard = self.entry.lock().await;
        match guard.as_ref() {
            Some(entry) if entry.key == key && entry.refreshed_at.elapsed() < self.ttl => {
                Some(entry.scores.clone())
            }
            _ => None,
        }
    }

    /// Replace the held entry with a freshly fetched result.
    pub async fn store(&self, key: String, scores: ScoreMap) {
        let mut guard = self.entry.lock().await;
        *guard = Some(CacheEntry {
            key,
            refreshed_at: Instant::now(),
            scores,
        });
    }

    /// Key of the held entry, expired or not.
    pub async fn held_key(&self) -> Option<String> {
        self.entry.lock().await.as_ref().map(|e| e.key.clone())
    }

    pub async fn clear(&self) {
        *self.entry.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(sku: &str, zone: &str, score: u8) -> ScoreMap {
        let mut map = ScoreMap::new();
        map.entry(sku.to_string()).or_default().insert(zone.to_string(), score);
        map
    }

    fn skus(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn key_is_order_insensitive() {
        let a = PlacementCache::cache_key("westeurope", "sub", &skus(&["B", "A", "C"]));
        let b = PlacementCache::cache_key("westeurope", "sub", &skus(&["C", "B", "A", "A"]));
        assert_eq!(a, b);
        assert_eq!(a, "westeurope-sub-A,B,C");
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl() {
        let cache = PlacementCache::default();
        cache.store("k".to_string(), scores("A", "1", 100)).await;

        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        assert_eq!(cache.get("k").await, Some(scores("A", "1", 100)));
    }

    #[tokio::test(start_paused = true)]
    async fn miss_after_ttl() {
        let cache = PlacementCache::default();
        cache.store("k".to_string(), scores("A", "1", 100)).await;

        tokio::time::advance(PLACEMENT_TTL).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn miss_on_other_key() {
        let cache = PlacementCache::default();
        cache.store("k1".to_string(), scores("A", "1", 100)).await;
        assert_eq!(cache.get("k2").await, None);
    }

    #[tokio::test]
    async fn store_replaces_held_entry() {
        let cache = PlacementCache::default();
        cache.store("k1".to_string(), scores("A", "1", 100)).await;
        cache.store("k2".to_string(), scores("B", "2", 25)).await;

        assert_eq!(cache.held_key().await.as_deref(), Some("k2"));
        assert_eq!(cache.get("k1").await, None);
        assert_eq!(cache.get("k2").await, Some(scores("B", "2", 25)));
    }

    #[tokio::test]
    async fn lock_released_after_hit() {
        let cache = PlacementCache::default();
        cache.store("k".to_string(), scores("A", "1", 50)).await;

        assert!(cache.get("k").await.is_some());
        // A second access would deadlock if the hit path kept the guard.
        assert!(cache.entry.try_lock().is_ok());
        cache.clear().await;
        assert_eq!(cache.held_key().await, None);
    }
}
