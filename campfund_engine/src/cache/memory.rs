use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use log::trace;

use crate::traits::{Cache, CacheError};

/// How often a write sweeps the whole map for expired entries.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Entries {
    map: HashMap<String, Entry>,
    purge_interval: Duration,
    next_purge: Instant,
}

impl Entries {
    fn new(purge_interval: Duration) -> Self {
        Self { map: HashMap::new(), purge_interval, next_purge: Instant::now() + purge_interval }
    }

    /// Expired entries are invisible to reads, so sweeping them out only bounds memory and can wait for the interval.
    fn purge_if_due(&mut self, now: Instant) {
        if now < self.next_purge {
            return;
        }
        self.next_purge = now + self.purge_interval;
        let before = self.map.len();
        self.map.retain(|_, e| e.is_live(now));
        let purged = before - self.map.len();
        if purged > 0 {
            trace!("🧠️ Purged {purged} expired cache entries");
        }
    }
}

/// A process-local TTL map. Expired entries are ignored on read and swept out periodically by writes.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<Entries>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_purge_interval(DEFAULT_PURGE_INTERVAL)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purge_interval(purge_interval: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(Entries::new(purge_interval))) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, CacheError> {
        self.entries.lock().map_err(|e| CacheError::Unavailable(format!("Cache lock is poisoned. {e}")))
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().map(|entries| entries.map.values().filter(|e| e.is_live(now)).count()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    async fn claim_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.purge_if_due(now);
        if entries.map.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.map.insert(key.to_string(), Entry { value: "1".to_string(), expires_at: now + ttl });
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries.map.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.purge_if_due(now);
        entries.map.insert(key.to_string(), Entry { value: value.to_string(), expires_at: now + ttl });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        Ok(entries.map.remove(key).is_some_and(|e| e.is_live(now)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn claims_are_exclusive_until_they_expire() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(50);
        assert!(cache.claim_if_absent("idempotency:evt-1:FT001", ttl).await.unwrap());
        assert!(!cache.claim_if_absent("idempotency:evt-1:FT001", ttl).await.unwrap());
        assert!(cache.claim_if_absent("idempotency:evt-2:FT001", ttl).await.unwrap());
        assert_eq!(cache.len(), 2);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.is_empty());
        assert!(cache.claim_if_absent("idempotency:evt-1:FT001", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn get_set_and_delete() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.get("campaign:1").await.unwrap(), None);
        cache.set("campaign:1", "{\"title\":\"Clean water\"}", ttl).await.unwrap();
        assert_eq!(cache.get("campaign:1").await.unwrap().as_deref(), Some("{\"title\":\"Clean water\"}"));
        assert!(cache.delete("campaign:1").await.unwrap());
        assert!(!cache.delete("campaign:1").await.unwrap());
        assert_eq!(cache.get("campaign:1").await.unwrap(), None);
    }

    fn stored(cache: &MemoryCache) -> usize {
        cache.lock().unwrap().map.len()
    }

    #[tokio::test]
    async fn expired_entries_are_swept_on_the_purge_interval() {
        let cache = MemoryCache::with_purge_interval(Duration::from_millis(300));
        let short = Duration::from_millis(10);
        assert!(cache.claim_if_absent("idempotency:evt-1:FT001", short).await.unwrap());
        assert!(cache.claim_if_absent("idempotency:evt-2:FT002", short).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        // No sweep is due yet. The expired entries stay in the map but no longer count as claims.
        assert!(cache.claim_if_absent("idempotency:evt-1:FT001", Duration::from_secs(60)).await.unwrap());
        assert_eq!(stored(&cache), 2);
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(350)).await;
        cache.set("campaign:1", "{}", Duration::from_secs(60)).await.unwrap();
        assert_eq!(stored(&cache), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("idempotency:evt-2:FT002").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = MemoryCache::new();
        let other = cache.clone();
        assert!(cache.claim_if_absent("k", Duration::from_secs(60)).await.unwrap());
        assert!(!other.claim_if_absent("k", Duration::from_secs(60)).await.unwrap());
    }
}
