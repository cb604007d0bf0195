// In-memory store instance
// Provides set-if-absent / compare-and-delete with per-key expiry

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StoreInstance;
use crate::error::StoreError;

/// A stored value with its expiry
struct StoredValue {
    value: String,
    /// `None` when the TTL reaches past the clock's range
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// Operation counters for one memory store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreStats {
    /// `set_if_absent` calls that reached the store
    pub set_calls: u64,
    /// `set_if_absent` calls that stored the value
    pub set_granted: u64,
    /// `compare_and_delete` calls that reached the store
    pub delete_calls: u64,
    /// `compare_and_delete` calls that removed a key
    pub deleted: u64,
    /// Calls rejected while the store was marked unavailable
    pub rejected: u64,
}

#[derive(Default)]
struct StatsCollector {
    set_calls: AtomicU64,
    set_granted: AtomicU64,
    delete_calls: AtomicU64,
    deleted: AtomicU64,
    rejected: AtomicU64,
}

/// In-process store instance backed by a `DashMap`.
///
/// Expired entries are treated as absent and dropped lazily when touched,
/// or eagerly through `purge_expired`. `set_available(false)` simulates an
/// outage and `set_latency` delays every operation.
pub struct MemoryStore {
    name: String,
    entries: DashMap<String, StoredValue>,
    available: AtomicBool,
    latency_us: AtomicU64,
    stats: StatsCollector,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            latency_us: AtomicU64::new(0),
            stats: StatsCollector::default(),
        }
    }

    /// Create a store that delays every operation by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Mark the store up or down
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        debug!(instance = %self.name, available, "Memory store availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn set_latency(&self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.latency_us.store(micros, Ordering::SeqCst);
    }

    /// Current value of `key`, ignoring expired entries
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Number of live (non-expired) keys
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(instance = %self.name, count = purged, "Purged expired entries");
        }
        purged
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            set_calls: self.stats.set_calls.load(Ordering::Relaxed),
            set_granted: self.stats.set_granted.load(Ordering::Relaxed),
            delete_calls: self.stats.delete_calls.load(Ordering::Relaxed),
            deleted: self.stats.deleted.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }

    async fn before_call(&self) -> Result<(), StoreError> {
        let latency = self.latency_us.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_micros(latency)).await;
        }
        if !self.is_available() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreInstance for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.before_call().await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.before_call().await?;
        self.stats.set_calls.fetch_add(1, Ordering::Relaxed);

        let stored = StoredValue {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        };

        // The entry guard holds the shard lock, so check and insert are atomic
        let granted = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(stored);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                true
            }
        };

        if granted {
            self.stats.set_granted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(granted)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.before_call().await?;
        self.stats.delete_calls.fetch_add(1, Ordering::Relaxed);

        let deleted = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.value == expected)
            .is_some();

        if deleted {
            self.stats.deleted.fetch_add(1, Ordering::Relaxed);
        } else {
            // Drop an expired copy while we are here
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new("mem-1");

        assert!(store.set_if_absent("key1", "token-a", TTL).await.unwrap());
        assert!(!store.set_if_absent("key1", "token-b", TTL).await.unwrap());
        assert_eq!(store.get("key1").as_deref(), Some("token-a"));

        // Same value is still rejected: the key exists
        assert!(!store.set_if_absent("key1", "token-a", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryStore::new("mem-1");
        store.set_if_absent("key1", "token-a", TTL).await.unwrap();

        // Wrong token leaves the key untouched
        assert!(!store.compare_and_delete("key1", "token-b").await.unwrap());
        assert_eq!(store.get("key1").as_deref(), Some("token-a"));

        assert!(store.compare_and_delete("key1", "token-a").await.unwrap());
        assert!(store.get("key1").is_none());

        // Deleting again is a no-op
        assert!(!store.compare_and_delete("key1", "token-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_beyond_clock_range_never_expires() {
        let store = MemoryStore::new("mem-1");

        assert!(store.set_if_absent("key1", "token-a", Duration::MAX).await.unwrap());
        assert!(!store.set_if_absent("key1", "token-b", TTL).await.unwrap());

        store.purge_expired();
        assert_eq!(store.get("key1").as_deref(), Some("token-a"));
        assert!(store.compare_and_delete("key1", "token-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete_missing_key() {
        let store = MemoryStore::new("mem-1");
        assert!(!store.compare_and_delete("nonexistent", "token").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_is_absent() {
        let store = MemoryStore::new("mem-1");

        assert!(store.set_if_absent("key1", "token-a", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get("key1").is_none());
        // Expired copy cannot be deleted by its old holder
        assert!(!store.compare_and_delete("key1", "token-a").await.unwrap());
        assert!(store.set_if_absent("key1", "token-b", TTL).await.unwrap());
        assert_eq!(store.get("key1").as_deref(), Some("token-b"));
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = MemoryStore::new("mem-1");
        assert!(store.set_if_absent("key1", "token-a", Duration::ZERO).await.unwrap());
        assert!(store.set_if_absent("key1", "token-b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::new("mem-1");
        store.set_available(false);

        assert_eq!(store.ping().await, Err(StoreError::Unavailable));
        assert_eq!(
            store.set_if_absent("key1", "token", TTL).await,
            Err(StoreError::Unavailable)
        );
        assert_eq!(
            store.compare_and_delete("key1", "token").await,
            Err(StoreError::Unavailable)
        );
        assert_eq!(store.stats().rejected, 3);

        store.set_available(true);
        assert!(store.ping().await.is_ok());
        assert!(store.set_if_absent("key1", "token", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_latency_is_applied() {
        let store = MemoryStore::new("slow").with_latency(Duration::from_millis(30));
        let start = Instant::now();
        store.ping().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new("mem-1");
        store.set_if_absent("short", "a", Duration::from_millis(5)).await.unwrap();
        store.set_if_absent("long", "b", TTL).await.unwrap();

        tokio::time::sleep(Duration::from_millis(15)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get("long").as_deref(), Some("b"));

        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryStore::new("mem-1");

        for i in 0..5 {
            store.set_if_absent(&format!("key-{}", i), "t", TTL).await.unwrap();
        }
        store.set_if_absent("key-0", "other", TTL).await.unwrap();
        store.compare_and_delete("key-0", "t").await.unwrap();
        store.compare_and_delete("key-1", "wrong").await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.set_calls, 6);
        assert_eq!(stats.set_granted, 5);
        assert_eq!(stats.delete_calls, 2);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.rejected, 0);
    }

    #[tokio::test]
    async fn test_concurrent_set_if_absent_single_winner() {
        let store = std::sync::Arc::new(MemoryStore::new("mem-1"));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .set_if_absent("contended", &format!("token-{}", i), TTL)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
